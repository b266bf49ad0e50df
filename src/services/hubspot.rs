//! HubSpot forms sync
//!
//! Contact form submissions are mirrored into HubSpot on a detached task.
//! The sync is best effort: failures are logged and never reach the visitor.

use crate::config::HubSpotConfig;
use crate::models::FormSubmission;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct HubSpotClient {
    client: reqwest::Client,
    config: HubSpotConfig,
}

impl HubSpotClient {
    pub fn new(config: &HubSpotConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config: config.clone() })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    fn endpoint(&self) -> Result<String> {
        let (Some(portal), Some(form)) = (&self.config.portal_id, &self.config.form_guid) else {
            bail!("HubSpot is not configured");
        };
        let kind = if self.config.access_token.is_some() { "secure/submit" } else { "submit" };
        Ok(format!(
            "{}/submissions/v3/integration/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            kind,
            portal,
            form
        ))
    }

    pub async fn sync_submission(&self, submission: &FormSubmission) -> Result<()> {
        let mut request = self.client.post(self.endpoint()?).json(&submission_payload(submission));
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("HubSpot request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HubSpot returned {}: {}", status, body));
        }
        Ok(())
    }

    /// Sync on a detached task. `None` when HubSpot is not configured.
    pub fn spawn_sync(self: &Arc<Self>, submission: FormSubmission) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }
        let client = Arc::clone(self);
        Some(tokio::spawn(async move {
            match client.sync_submission(&submission).await {
                Ok(()) => tracing::debug!(submission_id = submission.id, "Submission synced to HubSpot"),
                Err(e) => tracing::warn!(submission_id = submission.id, error = %e, "HubSpot sync failed"),
            }
        }))
    }
}

/// HubSpot field names: the visitor's name is split into first and last name
fn submission_payload(s: &FormSubmission) -> Value {
    let (first, last) = match s.name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (s.name.trim().to_string(), String::new()),
    };

    let mut fields = vec![
        json!({ "name": "email", "value": s.email }),
        json!({ "name": "firstname", "value": first }),
        json!({ "name": "message", "value": s.message }),
    ];
    if !last.is_empty() {
        fields.push(json!({ "name": "lastname", "value": last }));
    }
    if let Some(phone) = &s.phone {
        fields.push(json!({ "name": "phone", "value": phone }));
    }
    if let Some(company) = &s.company {
        fields.push(json!({ "name": "company", "value": company }));
    }

    let mut context = json!({ "pageName": s.form_name });
    if let Some(ip) = &s.remote_ip {
        context["ipAddress"] = json!(ip);
    }

    json!({ "fields": fields, "context": context })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionStatus;
    use axum::{extract::State, routing::post, Json, Router};
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn submission() -> FormSubmission {
        FormSubmission {
            id: 5,
            form_name: "kontakt".into(),
            name: "Anna Maria Svensson".into(),
            email: "anna@kund.se".into(),
            phone: Some("070-123 45 67".into()),
            company: None,
            message: "Ring mig".into(),
            campaign_variant_id: None,
            status: SubmissionStatus::New,
            remote_ip: Some("203.0.113.9".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_fields() {
        let payload = submission_payload(&submission());
        let fields = payload["fields"].as_array().unwrap();
        let value = |name: &str| {
            fields
                .iter()
                .find(|f| f["name"] == name)
                .map(|f| f["value"].as_str().unwrap().to_string())
        };
        assert_eq!(value("firstname").as_deref(), Some("Anna"));
        assert_eq!(value("lastname").as_deref(), Some("Maria Svensson"));
        assert_eq!(value("phone").as_deref(), Some("070-123 45 67"));
        assert_eq!(value("company"), None);
        assert_eq!(payload["context"]["ipAddress"], "203.0.113.9");
    }

    #[test]
    fn test_endpoint_variants() {
        let mut config = HubSpotConfig {
            portal_id: Some("123".into()),
            form_guid: Some("abc".into()),
            ..Default::default()
        };
        let client = HubSpotClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint().unwrap(),
            "https://api.hsforms.com/submissions/v3/integration/submit/123/abc"
        );

        config.access_token = Some("pat".into());
        let client = HubSpotClient::new(&config).unwrap();
        assert!(client.endpoint().unwrap().contains("/secure/submit/123/abc"));
    }

    #[tokio::test]
    async fn test_spawn_sync_disabled() {
        let client = Arc::new(HubSpotClient::new(&HubSpotConfig::default()).unwrap());
        assert!(client.spawn_sync(submission()).is_none());
    }

    #[tokio::test]
    async fn test_spawn_sync_posts_and_swallows_errors() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let app = Router::new()
            .route(
                "/submissions/v3/integration/submit/{portal}/{form}",
                post(|State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| async move {
                    let _ = tx.send(body);
                    Json(json!({ "inlineMessage": "Tack" }))
                }),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = HubSpotConfig {
            portal_id: Some("123".into()),
            form_guid: Some("abc".into()),
            access_token: None,
            base_url: format!("http://{}", addr),
        };
        let client = Arc::new(HubSpotClient::new(&config).unwrap());
        client.spawn_sync(submission()).unwrap().await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received["fields"][0]["value"], "anna@kund.se");

        // Unknown form: the task logs and completes without panicking
        let broken = Arc::new(
            HubSpotClient::new(&HubSpotConfig { form_guid: Some("saknas/extra".into()), ..config }).unwrap(),
        );
        broken.spawn_sync(submission()).unwrap().await.unwrap();
    }
}
