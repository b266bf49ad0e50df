//! Configuration management
//!
//! This module handles loading and parsing configuration for Portalen.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use crate::models::VariantKind;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload limits
    #[serde(default)]
    pub upload: UploadConfig,
    /// Image variant generation
    #[serde(default)]
    pub images: ImageConfig,
    /// Sessions and two-factor authentication
    #[serde(default)]
    pub security: SecurityConfig,
    /// Third-party integrations (Turnstile, HubSpot)
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    /// Outgoing mail for notifications
    #[serde(default)]
    pub mail: MailConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public origin of the site, used in links sent by mail
    #[serde(default = "default_site_url")]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_base_url: default_site_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/portalen.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_cache_capacity() -> u64 {
    10_000
}

/// Object storage configuration
///
/// `url` selects the backend: `s3://bucket/prefix` for S3-compatible storage,
/// `memory://` for an in-process store (development and tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_url")]
    pub url: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Base URL objects are publicly served from (CDN or bucket URL)
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Lifetime of presigned upload URLs
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            public_base_url: default_public_base_url(),
            presign_ttl_seconds: default_presign_ttl(),
        }
    }
}

fn default_storage_url() -> String {
    "memory://".to_string()
}

fn default_region() -> String {
    "eu-north-1".to_string()
}

fn default_public_base_url() -> String {
    "/media".to_string()
}

fn default_presign_ttl() -> u64 {
    900
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 15MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_max_file_size() -> u64 {
    15 * 1024 * 1024 // 15MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
        "image/svg+xml".to_string(),
        "application/pdf".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }
}

/// Image variant widths (max width in pixels). Variants are lossless WebP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,
    #[serde(default = "default_small_width")]
    pub small_width: u32,
    #[serde(default = "default_medium_width")]
    pub medium_width: u32,
    #[serde(default = "default_large_width")]
    pub large_width: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            thumb_width: default_thumb_width(),
            small_width: default_small_width(),
            medium_width: default_medium_width(),
            large_width: default_large_width(),
        }
    }
}

impl ImageConfig {
    /// Target width per variant kind
    pub fn width_for(&self, kind: VariantKind) -> u32 {
        match kind {
            VariantKind::Thumb => self.thumb_width,
            VariantKind::Small => self.small_width,
            VariantKind::Medium => self.medium_width,
            VariantKind::Large => self.large_width,
        }
    }
}

fn default_thumb_width() -> u32 {
    150
}

fn default_small_width() -> u32 {
    480
}

fn default_medium_width() -> u32 {
    960
}

fn default_large_width() -> u32 {
    1920
}

/// Sessions, login challenges and the 2FA grace period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Days a user may defer mandatory 2FA setup
    #[serde(default = "default_grace_days")]
    pub two_factor_grace_days: i64,
    /// Route users are sent to when the grace period has run out
    #[serde(default = "default_setup_path")]
    pub two_factor_setup_path: String,
    /// Secret used to sign pending-2FA login challenges
    #[serde(default = "default_challenge_secret")]
    pub challenge_secret: String,
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_seconds: i64,
    /// Issuer shown in authenticator apps
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            two_factor_grace_days: default_grace_days(),
            two_factor_setup_path: default_setup_path(),
            challenge_secret: default_challenge_secret(),
            challenge_ttl_seconds: default_challenge_ttl(),
            totp_issuer: default_totp_issuer(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_grace_days() -> i64 {
    30
}

fn default_setup_path() -> String {
    "/konto/tvastegsverifiering".to_string()
}

/// Placeholder shipped in sample configs. Never used to sign anything.
pub const DEFAULT_CHALLENGE_SECRET: &str = "change-me-in-production";

fn default_challenge_secret() -> String {
    DEFAULT_CHALLENGE_SECRET.to_string()
}

fn default_challenge_ttl() -> i64 {
    300
}

fn default_totp_issuer() -> String {
    "Portalen".to_string()
}

/// Third-party integrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub turnstile: TurnstileConfig,
    #[serde(default)]
    pub hubspot: HubSpotConfig,
}

/// Cloudflare Turnstile bot verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Secret key; verification is skipped when unset
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_turnstile_url")]
    pub verify_url: String,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: default_turnstile_url(),
        }
    }
}

fn default_turnstile_url() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
}

/// HubSpot forms API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSpotConfig {
    #[serde(default)]
    pub portal_id: Option<String>,
    #[serde(default)]
    pub form_guid: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_hubspot_url")]
    pub base_url: String,
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            portal_id: None,
            form_guid: None,
            access_token: None,
            base_url: default_hubspot_url(),
        }
    }
}

impl HubSpotConfig {
    /// Sync is only attempted when portal and form are configured
    pub fn is_enabled(&self) -> bool {
        self.portal_id.is_some() && self.form_guid.is_some()
    }
}

fn default_hubspot_url() -> String {
    "https://api.hsforms.com".to_string()
}

/// SMTP relay for notification mails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Recipient of new form submission notices
    #[serde(default)]
    pub notify_to: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from: default_mail_from(),
            notify_to: None,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Portalen <noreply@example.se>".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - PORTALEN_SERVER_HOST
    /// - PORTALEN_SERVER_PORT
    /// - PORTALEN_SERVER_CORS_ORIGIN
    /// - PORTALEN_DATABASE_URL
    /// - PORTALEN_CACHE_TTL_SECONDS
    /// - PORTALEN_STORAGE_URL
    /// - PORTALEN_STORAGE_ENDPOINT
    /// - PORTALEN_STORAGE_ACCESS_KEY_ID
    /// - PORTALEN_STORAGE_SECRET_ACCESS_KEY
    /// - PORTALEN_STORAGE_PUBLIC_BASE_URL
    /// - PORTALEN_SECURITY_CHALLENGE_SECRET
    /// - PORTALEN_SECURITY_TWO_FACTOR_GRACE_DAYS
    /// - PORTALEN_TURNSTILE_SECRET_KEY
    /// - PORTALEN_HUBSPOT_PORTAL_ID
    /// - PORTALEN_HUBSPOT_FORM_GUID
    /// - PORTALEN_HUBSPOT_ACCESS_TOKEN
    /// - PORTALEN_MAIL_SMTP_HOST
    /// - PORTALEN_MAIL_SMTP_USERNAME
    /// - PORTALEN_MAIL_SMTP_PASSWORD
    /// - PORTALEN_MAIL_NOTIFY_TO
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok()
        }

        if let Some(host) = var("PORTALEN_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORTALEN_SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(origin) = var("PORTALEN_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        if let Some(url) = var("PORTALEN_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(ttl) = var("PORTALEN_CACHE_TTL_SECONDS").and_then(|t| t.parse::<u64>().ok()) {
            self.cache.ttl_seconds = ttl;
        }

        if let Some(url) = var("PORTALEN_STORAGE_URL") {
            self.storage.url = url;
        }
        if let Some(endpoint) = var("PORTALEN_STORAGE_ENDPOINT") {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(key) = var("PORTALEN_STORAGE_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key);
        }
        if let Some(secret) = var("PORTALEN_STORAGE_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }
        if let Some(base) = var("PORTALEN_STORAGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = base;
        }

        if let Some(secret) = var("PORTALEN_SECURITY_CHALLENGE_SECRET") {
            self.security.challenge_secret = secret;
        }
        if let Some(days) = var("PORTALEN_SECURITY_TWO_FACTOR_GRACE_DAYS")
            .and_then(|d| d.parse::<i64>().ok())
            .filter(|d| *d >= 0)
        {
            self.security.two_factor_grace_days = days;
        }

        if let Some(secret) = var("PORTALEN_TURNSTILE_SECRET_KEY") {
            self.integrations.turnstile.secret_key = Some(secret);
        }
        if let Some(portal) = var("PORTALEN_HUBSPOT_PORTAL_ID") {
            self.integrations.hubspot.portal_id = Some(portal);
        }
        if let Some(form) = var("PORTALEN_HUBSPOT_FORM_GUID") {
            self.integrations.hubspot.form_guid = Some(form);
        }
        if let Some(token) = var("PORTALEN_HUBSPOT_ACCESS_TOKEN") {
            self.integrations.hubspot.access_token = Some(token);
        }

        if let Some(host) = var("PORTALEN_MAIL_SMTP_HOST") {
            self.mail.smtp_host = Some(host);
        }
        if let Some(user) = var("PORTALEN_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = Some(user);
        }
        if let Some(password) = var("PORTALEN_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = Some(password);
        }
        if let Some(to) = var("PORTALEN_MAIL_NOTIFY_TO") {
            self.mail.notify_to = Some(to);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
