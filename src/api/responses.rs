//! API error responses
//!
//! Every failure leaves the API as `{"error": {"code", "message", "details"}}`.
//! Service errors convert into [`ApiError`] here so handlers can use `?`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::services::{
    AccountServiceError, CategoryServiceError, ContentServiceError, FieldErrors, FormServiceError,
    MediaServiceError, PageServiceError, ServiceCatalogError, TurnstileError, TwoFactorError, UserServiceError,
};

/// Shown for every unexpected failure; the cause only goes to the log
pub const GENERIC_ERROR_MESSAGE: &str = "Ett oväntat fel inträffade. Försök igen senare.";

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMIT", message)
    }

    /// 400 listing each offending field under `details.fields`
    pub fn fields(errors: FieldErrors) -> Self {
        let message = match errors.iter().count() {
            1 => errors.iter().map(|(_, m)| m.to_string()).next().unwrap_or_default(),
            _ => "Kontrollera de markerade fälten".to_string(),
        };
        Self::with_details("VALIDATION_ERROR", message, json!({ "fields": errors }))
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::fields(FieldErrors::single(field, message))
    }

    /// Log the real cause and answer with the generic message
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "Unhandled error");
        Self::new("INTERNAL_ERROR", GENERIC_ERROR_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

// ============================================================================
// Service error conversions
// ============================================================================

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        use CategoryServiceError::*;
        match err {
            NotFound(_) => ApiError::not_found(err.to_string()),
            ParentNotFound(_) | CircularReference => ApiError::field("parent_id", err.to_string()),
            DuplicateSlug(_) | DuplicatePath(_) => ApiError::field("slug", err.to_string()),
            HasServices(_) => ApiError::conflict(err.to_string()),
            ValidationError { field, message } => ApiError::field(field, message),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<PageServiceError> for ApiError {
    fn from(err: PageServiceError) -> Self {
        use PageServiceError::*;
        match err {
            NotFound(_) => ApiError::not_found(err.to_string()),
            ParentNotFound(_) | CircularReference => ApiError::field("parent_id", err.to_string()),
            DuplicatePath(_) => ApiError::field("slug", err.to_string()),
            ValidationError { field, message } => ApiError::field(field, message),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<ServiceCatalogError> for ApiError {
    fn from(err: ServiceCatalogError) -> Self {
        use ServiceCatalogError::*;
        match err {
            NotFound(_) => ApiError::not_found(err.to_string()),
            CategoryNotFound(_) => ApiError::field("category_id", err.to_string()),
            DuplicateSlug(_) | DuplicatePath(_) => ApiError::field("slug", err.to_string()),
            ValidationError { field, message } => ApiError::field(field, message),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<ContentServiceError> for ApiError {
    fn from(err: ContentServiceError) -> Self {
        use ContentServiceError::*;
        match err {
            NotFound { .. } => ApiError::not_found(err.to_string()),
            DuplicateSlug(_) => ApiError::field("slug", err.to_string()),
            ValidationError { field, message } => ApiError::field(field, message),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<TwoFactorError> for ApiError {
    fn from(err: TwoFactorError) -> Self {
        use TwoFactorError::*;
        match err {
            AlreadyEnabled | NotEnabled | NoPendingSetup => ApiError::conflict(err.to_string()),
            InvalidCode => ApiError::field("code", err.to_string()),
            InvalidChallenge => ApiError::unauthorized(err.to_string()),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        use UserServiceError::*;
        match err {
            InvalidCredentials => ApiError::unauthorized(err.to_string()),
            AccountBanned | Forbidden(_) => ApiError::forbidden(err.to_string()),
            EmailTaken(_) => ApiError::conflict(err.to_string()),
            NotFound(_) => ApiError::not_found(err.to_string()),
            RateLimited => ApiError::rate_limited(err.to_string()),
            ValidationError { field, message } => ApiError::field(field, message),
            TwoFactor(e) => e.into(),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<MediaServiceError> for ApiError {
    fn from(err: MediaServiceError) -> Self {
        use MediaServiceError::*;
        match err {
            NotFound(_) => ApiError::not_found(err.to_string()),
            ValidationError { field, message } => ApiError::field(field, message),
            PresignUnsupported => ApiError::conflict(err.to_string()),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<TurnstileError> for ApiError {
    fn from(err: TurnstileError) -> Self {
        match err {
            TurnstileError::MissingToken | TurnstileError::Rejected(_) => {
                ApiError::field("turnstileToken", err.to_string())
            }
            TurnstileError::Unavailable(e) => {
                tracing::warn!(error = %e, "Turnstile unavailable");
                ApiError::new("SERVICE_UNAVAILABLE", "Verifieringen kunde inte genomföras. Försök igen senare.")
            }
        }
    }
}

impl From<FormServiceError> for ApiError {
    fn from(err: FormServiceError) -> Self {
        match err {
            FormServiceError::Invalid(errors) => ApiError::fields(errors),
            FormServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            FormServiceError::Turnstile(e) => e.into(),
            FormServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<AccountServiceError> for ApiError {
    fn from(err: AccountServiceError) -> Self {
        use AccountServiceError::*;
        match err {
            Invalid(errors) => ApiError::fields(errors),
            NotFound { .. } => ApiError::not_found(err.to_string()),
            InvalidTransition { .. } => ApiError::field("status", err.to_string()),
            InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::field("slug", "x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("WHATEVER", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_hides_cause() {
        let err = ApiError::internal("database is locked");
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert_eq!(err.error.message, GENERIC_ERROR_MESSAGE);
        assert!(err.error.details.is_none());
    }

    #[test]
    fn test_field_errors_in_details() {
        let mut errors = FieldErrors::new();
        errors.add("name", "Namn måste anges");
        errors.add("email", "Ange en giltig e-postadress");
        let err = ApiError::fields(errors);

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"]["fields"]["name"], "Namn måste anges");
        assert_eq!(json["error"]["message"], "Kontrollera de markerade fälten");

        let single = ApiError::field("slug", "Sluggen används redan");
        assert_eq!(single.error.message, "Sluggen används redan");
    }

    #[test]
    fn test_duplicate_path_is_bad_request() {
        let err: ApiError = CategoryServiceError::DuplicatePath("/tjanster/it".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.error.message.contains("/tjanster/it"));

        let err: ApiError = PageServiceError::CircularReference.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_user_errors() {
        let err: ApiError = UserServiceError::EmailTaken("a@b.se".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err: ApiError = UserServiceError::TwoFactor(TwoFactorError::InvalidCode).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = UserServiceError::InternalError(anyhow::anyhow!("boom")).into();
        assert_eq!(err.error.message, GENERIC_ERROR_MESSAGE);
    }
}
