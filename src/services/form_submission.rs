//! Contact form submissions
//!
//! Public submissions are validated, checked against Turnstile and stored
//! together with the campaign conversion they represent. CRM sync and the
//! notification mail run afterwards on detached tasks.

use crate::db::repositories::{CampaignRepository, FormSubmissionRepository};
use crate::models::{FormSubmission, SubmissionStatus, SubmitFormInput};
use crate::services::email::Mailer;
use crate::services::hubspot::HubSpotClient;
use crate::services::turnstile::{TurnstileError, TurnstileVerifier};
use crate::services::user::is_valid_email;
use crate::services::validation::FieldErrors;
use chrono::Utc;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

const MAX_NAME_LENGTH: usize = 100;
const MAX_MESSAGE_LENGTH: usize = 5000;
const MAX_SHORT_FIELD_LENGTH: usize = 100;
const MAX_FORM_NAME_LENGTH: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum FormServiceError {
    #[error("Formuläret innehåller fel: {0}")]
    Invalid(FieldErrors),

    #[error("Meddelandet hittades inte: {0}")]
    NotFound(i64),

    #[error(transparent)]
    Turnstile(#[from] TurnstileError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct SubmissionList {
    pub items: Vec<FormSubmission>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub struct FormSubmissionService {
    repo: Arc<dyn FormSubmissionRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    turnstile: Arc<TurnstileVerifier>,
    hubspot: Arc<HubSpotClient>,
    mailer: Arc<Mailer>,
}

impl FormSubmissionService {
    pub fn new(
        repo: Arc<dyn FormSubmissionRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        turnstile: Arc<TurnstileVerifier>,
        hubspot: Arc<HubSpotClient>,
        mailer: Arc<Mailer>,
    ) -> Self {
        Self {
            repo,
            campaigns,
            turnstile,
            hubspot,
            mailer,
        }
    }

    /// Accept a public form post
    pub async fn submit(
        &self,
        input: SubmitFormInput,
        remote_ip: Option<IpAddr>,
    ) -> Result<FormSubmission, FormServiceError> {
        let mut submission = validate_submission(&input).map_err(FormServiceError::Invalid)?;

        let ip = remote_ip.map(|ip| ip.to_string());
        self.turnstile.verify(input.turnstile_token.as_deref(), ip.as_deref()).await?;

        if let Some(variant_id) = submission.campaign_variant_id {
            if self.campaigns.get_variant(variant_id).await?.is_none() {
                return Err(FormServiceError::Invalid(FieldErrors::single(
                    "campaign_variant_id",
                    "Okänd kampanjvariant",
                )));
            }
        }

        submission.remote_ip = ip;
        let created = self.repo.create_with_conversion(&submission).await?;
        tracing::info!(
            submission_id = created.id,
            form = %created.form_name,
            variant_id = ?created.campaign_variant_id,
            "Form submission received"
        );

        self.hubspot.spawn_sync(created.clone());
        if self.mailer.is_enabled() {
            let mailer = Arc::clone(&self.mailer);
            let notified = created.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.notify_submission(&notified).await {
                    tracing::warn!(submission_id = notified.id, error = %e, "Submission notification failed");
                }
            });
        }

        Ok(created)
    }

    pub async fn list(
        &self,
        status: Option<SubmissionStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<SubmissionList, FormServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (items, total) = self.repo.list(status, page, per_page).await?;
        Ok(SubmissionList { items, total, page, per_page })
    }

    pub async fn get(&self, id: i64) -> Result<FormSubmission, FormServiceError> {
        self.repo.get_by_id(id).await?.ok_or(FormServiceError::NotFound(id))
    }

    pub async fn update_status(&self, id: i64, status: SubmissionStatus) -> Result<FormSubmission, FormServiceError> {
        if !self.repo.update_status(id, status).await? {
            return Err(FormServiceError::NotFound(id));
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), FormServiceError> {
        if !self.repo.delete(id).await? {
            return Err(FormServiceError::NotFound(id));
        }
        tracing::info!(submission_id = id, "Form submission deleted");
        Ok(())
    }

    pub async fn count_by_status(&self, status: SubmissionStatus) -> Result<i64, FormServiceError> {
        Ok(self.repo.count_by_status(status).await?)
    }
}

/// Trimmed submission ready for storage, or every field problem found
fn validate_submission(input: &SubmitFormInput) -> Result<FormSubmission, FieldErrors> {
    let mut errors = FieldErrors::new();

    let form_name = input.form_name.trim().to_lowercase();
    errors.check(
        !form_name.is_empty()
            && form_name.len() <= MAX_FORM_NAME_LENGTH
            && form_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        "form_name",
        "Ogiltigt formulärnamn",
    );

    let name = input.name.trim();
    errors.check(!name.is_empty(), "name", "Namn måste anges");
    errors.check(
        name.chars().count() <= MAX_NAME_LENGTH,
        "name",
        format!("Namnet får vara högst {} tecken", MAX_NAME_LENGTH),
    );

    let email = input.email.trim().to_lowercase();
    errors.check(is_valid_email(&email), "email", "Ange en giltig e-postadress");

    let message = input.message.trim();
    errors.check(!message.is_empty(), "message", "Meddelande måste anges");
    errors.check(
        message.chars().count() <= MAX_MESSAGE_LENGTH,
        "message",
        format!("Meddelandet får vara högst {} tecken", MAX_MESSAGE_LENGTH),
    );

    let phone = optional_field(input.phone.as_deref());
    if let Some(phone) = &phone {
        errors.check(
            phone.len() <= 30
                && phone.chars().filter(char::is_ascii_digit).count() >= 6
                && phone.chars().all(|c| c.is_ascii_digit() || " +-()".contains(c)),
            "phone",
            "Ange ett giltigt telefonnummer",
        );
    }

    let company = optional_field(input.company.as_deref());
    if let Some(company) = &company {
        errors.check(
            company.chars().count() <= MAX_SHORT_FIELD_LENGTH,
            "company",
            format!("Företagsnamnet får vara högst {} tecken", MAX_SHORT_FIELD_LENGTH),
        );
    }

    errors.into_result()?;

    let now = Utc::now();
    Ok(FormSubmission {
        id: 0,
        form_name,
        name: name.to_string(),
        email,
        phone,
        company,
        message: message.to_string(),
        campaign_variant_id: input.campaign_variant_id,
        status: SubmissionStatus::New,
        remote_ip: None,
        created_at: now,
        updated_at: now,
    })
}

fn optional_field(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
