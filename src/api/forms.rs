//! Contact form endpoints
//!
//! - POST /api/v1/forms/submit - Public, Turnstile-protected
//! - /api/v1/admin/submissions - Admin inbox

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::ClientIp;
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{FormSubmission, SubmissionStatus, SubmitFormInput};
use crate::services::form_submission::SubmissionList;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: i64,
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionQuery {
    pub status: Option<SubmissionStatus>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SubmissionStatus,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/submit", post(submit))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_submissions))
        .route("/{id}", get(get_submission).delete(delete_submission))
        .route("/{id}/status", put(update_status))
}

async fn submit(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(input): Json<SubmitFormInput>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = state.form_service.submit(input, ip).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            id: submission.id,
            received: true,
        }),
    ))
}

async fn list_submissions(
    State(state): State<AppState>,
    Query(q): Query<SubmissionQuery>,
) -> Result<Json<SubmissionList>, ApiError> {
    Ok(Json(state.form_service.list(q.status, q.page, q.per_page).await?))
}

async fn get_submission(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<FormSubmission>, ApiError> {
    Ok(Json(state.form_service.get(id).await?))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<FormSubmission>, ApiError> {
    Ok(Json(state.form_service.update_status(id, body.status).await?))
}

async fn delete_submission(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.form_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
