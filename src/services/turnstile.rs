//! Cloudflare Turnstile verification for public forms

use crate::config::TurnstileConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    #[error("Verifieringstoken saknas")]
    MissingToken,

    #[error("Verifieringen misslyckades")]
    Rejected(Vec<String>),

    #[error("Verifieringstjänsten svarar inte: {0}")]
    Unavailable(#[from] anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(config: &TurnstileConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        let secret = config.secret_key.clone().filter(|s| !s.is_empty());
        if secret.is_none() {
            tracing::warn!("Turnstile secret not configured, form verification is disabled");
        }
        Ok(Self {
            client,
            secret,
            verify_url: config.verify_url.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check a widget token. Passes without a network call when no secret is configured.
    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> Result<(), TurnstileError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(TurnstileError::MissingToken)?;

        let mut body = json!({ "secret": secret, "response": token });
        if let Some(ip) = remote_ip {
            body["remoteip"] = json!(ip);
        }

        let response: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .json(&body)
            .send()
            .await
            .context("Turnstile request failed")?
            .error_for_status()
            .context("Turnstile returned an error status")?
            .json()
            .await
            .context("Invalid Turnstile response")?;

        if response.success {
            Ok(())
        } else {
            tracing::info!(errors = ?response.error_codes, "Turnstile rejected token");
            Err(TurnstileError::Rejected(response.error_codes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;

    /// Fake siteverify endpoint that accepts the token "ok"
    async fn fake_siteverify() -> String {
        let app = Router::new().route(
            "/siteverify",
            post(|Json(body): Json<Value>| async move {
                let ok = body["response"] == "ok" && body["secret"] == "hemlis";
                Json(json!({ "success": ok, "error-codes": if ok { vec![] } else { vec!["invalid-input-response"] } }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/siteverify", addr)
    }

    fn verifier(secret: Option<&str>, verify_url: String) -> TurnstileVerifier {
        TurnstileVerifier::new(&TurnstileConfig {
            secret_key: secret.map(String::from),
            verify_url,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_without_secret() {
        let v = verifier(None, "http://127.0.0.1:9/never".into());
        assert!(!v.is_enabled());
        v.verify(None, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_token() {
        let v = verifier(Some("hemlis"), "http://127.0.0.1:9/never".into());
        assert!(matches!(v.verify(Some("  "), None).await, Err(TurnstileError::MissingToken)));
    }

    #[tokio::test]
    async fn test_accept_and_reject() {
        let v = verifier(Some("hemlis"), fake_siteverify().await);
        v.verify(Some("ok"), Some("203.0.113.9")).await.unwrap();
        match v.verify(Some("fel"), None).await {
            Err(TurnstileError::Rejected(codes)) => assert_eq!(codes, vec!["invalid-input-response"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_is_unavailable() {
        let v = verifier(Some("hemlis"), "http://127.0.0.1:9/siteverify".into());
        assert!(matches!(v.verify(Some("ok"), None).await, Err(TurnstileError::Unavailable(_))));
    }
}
