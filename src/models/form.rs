//! Contact form submission model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: i64,
    /// Which form on the site produced this, e.g. `kontakt`
    pub form_name: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub message: String,
    /// Campaign variant the visitor saw, if any
    pub campaign_variant_id: Option<i64>,
    pub status: SubmissionStatus,
    pub remote_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inbox state of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    New,
    Read,
    Archived,
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        Self::New
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::New => write!(f, "new"),
            SubmissionStatus::Read => write!(f, "read"),
            SubmissionStatus::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(SubmissionStatus::New),
            "read" => Ok(SubmissionStatus::Read),
            "archived" => Ok(SubmissionStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid submission status: {}", s)),
        }
    }
}

/// Public form payload
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFormInput {
    #[serde(default = "default_form_name")]
    pub form_name: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub message: String,
    #[serde(default)]
    pub campaign_variant_id: Option<i64>,
    /// Cloudflare Turnstile response token
    #[serde(default, rename = "turnstileToken", alias = "turnstile_token")]
    pub turnstile_token: Option<String>,
}

fn default_form_name() -> String {
    "kontakt".to_string()
}
