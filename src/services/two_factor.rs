//! Two-factor authentication
//!
//! TOTP (SHA1, 6 digits, 30 second step) with single-use backup codes,
//! signed login challenges for the second login step, and the grace gate
//! that makes 2FA mandatory once a user's grace period has run out.

use crate::config::{SecurityConfig, DEFAULT_CHALLENGE_SECRET};
use crate::db::repositories::{TwoFactorRepository, UserRepository};
use crate::models::User;
use crate::services::random::{random_bytes, random_hex};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use data_encoding::{BASE32_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use moka::future::Cache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

type HmacSha256 = Hmac<Sha256>;

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;
const BACKUP_CODE_COUNT: usize = 10;
const CHALLENGE_NONCE_BYTES: usize = 16;

/// Routes a user may reach while the gate demands 2FA setup
const EXEMPT_PREFIXES: &[&str] = &[
    "/api/v1/account/two-factor",
    "/api/v1/auth/logout",
    "/api/v1/auth/me",
];

#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("Tvåstegsverifiering är redan aktiverad")]
    AlreadyEnabled,

    #[error("Tvåstegsverifiering är inte aktiverad")]
    NotEnabled,

    #[error("Ingen påbörjad aktivering av tvåstegsverifiering")]
    NoPendingSetup,

    #[error("Ogiltig verifieringskod")]
    InvalidCode,

    #[error("Inloggningen har gått ut, logga in igen")]
    InvalidChallenge,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Returned once when setup begins
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    /// Base32 secret for manual entry
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub backup_codes_remaining: i64,
    pub grace_expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Grace gate
// ============================================================================

/// Outcome of the per-request grace check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceDecision {
    Allow,
    /// First sighting of the user; store this expiry and let the request through
    InitializeGrace(DateTime<Utc>),
    /// Grace period over and 2FA still not enabled
    RequireSetup,
}

pub fn evaluate_grace(
    enabled: bool,
    grace_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace_days: i64,
) -> GraceDecision {
    if enabled {
        return GraceDecision::Allow;
    }
    match grace_expires_at {
        None => GraceDecision::InitializeGrace(now + Duration::days(grace_days)),
        Some(expires) if now >= expires => GraceDecision::RequireSetup,
        Some(_) => GraceDecision::Allow,
    }
}

pub fn is_exempt_path(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|prefix| {
        path == *prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
    })
}

/// `setup_path?callbackUrl=<original>`, with the original path and query encoded
pub fn setup_redirect(setup_path: &str, original: &str) -> String {
    format!("{}?callbackUrl={}", setup_path, urlencoding::encode(original))
}

// ============================================================================
// Login challenge
// ============================================================================

/// Signs `user_id.expires.nonce` so the second login step needs no server
/// state beyond the set of challenges already used
#[derive(Clone)]
pub struct ChallengeSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl ChallengeSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Signer for the configured secret. An empty or shipped default secret
    /// is replaced by a random one that lives as long as the process.
    pub fn from_config(config: &SecurityConfig) -> anyhow::Result<Self> {
        let secret = config.challenge_secret.trim();
        if secret.is_empty() || secret == DEFAULT_CHALLENGE_SECRET {
            tracing::warn!(
                "security.challenge_secret is not set, signing 2FA login challenges with a random key \
                 (pending logins will not survive a restart)"
            );
            return Ok(Self::new(random_bytes::<32>()?.to_vec(), config.challenge_ttl_seconds));
        }
        Ok(Self::new(secret, config.challenge_ttl_seconds))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }

    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) -> anyhow::Result<String> {
        let payload = format!(
            "{}.{}.{}",
            user_id,
            (now + self.ttl).timestamp(),
            random_hex(CHALLENGE_NONCE_BYTES)?
        );
        let mut mac = self.mac().ok_or_else(|| anyhow!("Invalid challenge secret"))?;
        mac.update(payload.as_bytes());
        Ok(format!("{}.{}", payload, HEXLOWER.encode(&mac.finalize().into_bytes())))
    }

    /// User id of a valid, unexpired token
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<i64> {
        let (payload, signature) = token.rsplit_once('.')?;
        let mut parts = payload.splitn(3, '.');
        let user_id: i64 = parts.next()?.parse().ok()?;
        let expires: i64 = parts.next()?.parse().ok()?;
        parts.next().filter(|nonce| !nonce.is_empty())?;

        let signature = HEXLOWER.decode(signature.as_bytes()).ok()?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        (now.timestamp() < expires).then_some(user_id)
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct TwoFactorService {
    users: Arc<dyn UserRepository>,
    repo: Arc<dyn TwoFactorRepository>,
    signer: ChallengeSigner,
    /// Challenges that already completed a login, kept until they expire anyway
    used_challenges: Cache<String, ()>,
    issuer: String,
    grace_days: i64,
}

impl TwoFactorService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        repo: Arc<dyn TwoFactorRepository>,
        config: &SecurityConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self::with_signer(users, repo, config, ChallengeSigner::from_config(config)?))
    }

    pub fn with_signer(
        users: Arc<dyn UserRepository>,
        repo: Arc<dyn TwoFactorRepository>,
        config: &SecurityConfig,
        signer: ChallengeSigner,
    ) -> Self {
        let ttl = signer.ttl().to_std().unwrap_or_default().max(std::time::Duration::from_secs(1));
        Self {
            users,
            repo,
            used_challenges: Cache::builder().time_to_live(ttl).build(),
            signer,
            issuer: config.totp_issuer.clone(),
            grace_days: config.two_factor_grace_days,
        }
    }

    pub async fn status(&self, user: &User) -> Result<TwoFactorStatus, TwoFactorError> {
        let remaining = self
            .repo
            .count_unused_backup_codes(user.id)
            .await
            .context("Failed to count backup codes")?;
        Ok(TwoFactorStatus {
            enabled: user.two_factor_enabled,
            backup_codes_remaining: remaining,
            grace_expires_at: user.two_factor_grace_expires_at,
        })
    }

    /// Generate a secret and park it until the user proves they can use it
    pub async fn begin_setup(&self, user: &User) -> Result<TwoFactorSetup, TwoFactorError> {
        if user.two_factor_enabled {
            return Err(TwoFactorError::AlreadyEnabled);
        }

        let secret = BASE32_NOPAD.encode(&random_bytes::<20>()?);
        let otpauth_url = self.totp(&secret, &user.email)?.get_url();

        self.repo
            .set_pending_secret(user.id, Some(&secret))
            .await
            .context("Failed to store pending 2FA secret")?;

        tracing::info!(user_id = user.id, "2FA setup started");
        Ok(TwoFactorSetup { secret, otpauth_url })
    }

    /// Enable 2FA and return the backup codes in plain text, once
    pub async fn confirm_setup(&self, user: &User, code: &str) -> Result<Vec<String>, TwoFactorError> {
        let user = self.reload(user.id).await?;
        if user.two_factor_enabled {
            return Err(TwoFactorError::AlreadyEnabled);
        }
        let pending = user.two_factor_pending_secret.as_deref().ok_or(TwoFactorError::NoPendingSetup)?;

        if !self.check_totp(pending, &user.email, code, Utc::now())? {
            return Err(TwoFactorError::InvalidCode);
        }

        let (codes, hashes) = generate_backup_codes()?;
        self.repo
            .enable(user.id, pending, &hashes)
            .await
            .context("Failed to enable 2FA")?;

        tracing::info!(user_id = user.id, "2FA enabled");
        Ok(codes)
    }

    /// Accept a current TOTP code or an unused backup code, consuming the latter
    pub async fn verify(&self, user: &User, code: &str) -> Result<(), TwoFactorError> {
        let secret = match (user.two_factor_enabled, user.two_factor_secret.as_deref()) {
            (true, Some(secret)) => secret,
            _ => return Err(TwoFactorError::NotEnabled),
        };

        if self.check_totp(secret, &user.email, code, Utc::now())? {
            return Ok(());
        }

        let normalized = normalize_backup_code(code);
        if !normalized.is_empty() {
            let consumed = self
                .repo
                .consume_backup_code(user.id, &hash_backup_code(&normalized))
                .await
                .context("Failed to check backup code")?;
            if consumed {
                tracing::info!(user_id = user.id, "Backup code used");
                return Ok(());
            }
        }

        Err(TwoFactorError::InvalidCode)
    }

    /// Turn 2FA off. The grace period restarts, so the gate does not fire at once.
    pub async fn disable(&self, user: &User, code: &str) -> Result<(), TwoFactorError> {
        self.verify(user, code).await?;
        self.repo
            .disable(user.id, Utc::now() + Duration::days(self.grace_days))
            .await
            .context("Failed to disable 2FA")?;
        tracing::info!(user_id = user.id, "2FA disabled");
        Ok(())
    }

    pub async fn regenerate_backup_codes(&self, user: &User, code: &str) -> Result<Vec<String>, TwoFactorError> {
        self.verify(user, code).await?;
        let (codes, hashes) = generate_backup_codes()?;
        self.repo
            .replace_backup_codes(user.id, &hashes)
            .await
            .context("Failed to replace backup codes")?;
        Ok(codes)
    }

    pub fn issue_challenge(&self, user_id: i64) -> Result<String, TwoFactorError> {
        Ok(self.signer.issue(user_id, Utc::now())?)
    }

    pub fn verify_challenge(&self, challenge: &str) -> Result<i64, TwoFactorError> {
        self.signer.verify(challenge, Utc::now()).ok_or(TwoFactorError::InvalidChallenge)
    }

    /// Second login step: the challenge from the password step plus a code.
    /// Returns the user a session should be created for. A challenge works once.
    pub async fn complete_login(&self, challenge: &str, code: &str) -> Result<User, TwoFactorError> {
        let user_id = self.verify_challenge(challenge)?;
        if self.used_challenges.contains_key(challenge) {
            return Err(TwoFactorError::InvalidChallenge);
        }
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .filter(|u| u.is_active())
            .ok_or(TwoFactorError::InvalidChallenge)?;

        self.verify(&user, code).await?;

        // Two requests racing with the same challenge: only the first insert wins
        let entry = self.used_challenges.entry(challenge.to_string()).or_insert(()).await;
        if !entry.is_fresh() {
            return Err(TwoFactorError::InvalidChallenge);
        }
        Ok(user)
    }

    /// Per-request grace check. Initializes the expiry on first sight.
    pub async fn enforce_grace(&self, user: &User, now: DateTime<Utc>) -> Result<GraceDecision, TwoFactorError> {
        let decision = evaluate_grace(user.two_factor_enabled, user.two_factor_grace_expires_at, now, self.grace_days);
        if let GraceDecision::InitializeGrace(expires) = decision {
            let stored = self
                .repo
                .initialize_grace(user.id, expires)
                .await
                .context("Failed to initialize 2FA grace period")?;
            if stored {
                tracing::debug!(user_id = user.id, %expires, "2FA grace period started");
            }
        }
        Ok(decision)
    }

    async fn reload(&self, user_id: i64) -> Result<User, TwoFactorError> {
        Ok(self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| anyhow!("User {} disappeared", user_id))?)
    }

    fn totp(&self, secret: &str, account: &str) -> Result<TOTP, TwoFactorError> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("Invalid TOTP secret: {:?}", e))?;
        Ok(TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("Invalid TOTP parameters: {:?}", e))?)
    }

    fn check_totp(&self, secret: &str, account: &str, code: &str, now: DateTime<Utc>) -> Result<bool, TwoFactorError> {
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }
        Ok(self.totp(secret, account)?.check(&code, now.timestamp().max(0) as u64))
    }
}

fn generate_backup_codes() -> anyhow::Result<(Vec<String>, Vec<String>)> {
    let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
    let mut hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
    for _ in 0..BACKUP_CODE_COUNT {
        let raw = random_hex(5)?;
        hashes.push(hash_backup_code(&raw));
        codes.push(format!("{}-{}", &raw[..5], &raw[5..]));
    }
    Ok((codes, hashes))
}

fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn hash_backup_code(normalized: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(normalized.as_bytes()))
}
