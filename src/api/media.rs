//! Media library endpoints (author and up)
//!
//! - POST /api/v1/admin/media - multipart upload through the server, field `file`, optional `alt`
//! - POST /api/v1/admin/media/presign - signed URL for a direct upload to the bucket
//! - POST /api/v1/admin/media/register - record an object uploaded with a presigned URL
//! - GET /api/v1/admin/media, GET/DELETE /api/v1/admin/media/{id}, PUT /api/v1/admin/media/{id}/alt

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::AuthenticatedUser;
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::MediaWithUrls;
use crate::services::media::MediaList;
use crate::services::storage::PresignedUpload;

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub key: String,
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AltRequest {
    pub alt_text: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_media).post(upload_media))
        .route("/presign", post(presign))
        .route("/register", post(register))
        .route("/{id}", get(get_media).delete(delete_media))
        .route("/{id}/alt", put(update_alt))
}

/// Multipart upload. The file part must carry a content type.
async fn upload_media(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut alt_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::field("file", format!("Kunde inte läsa uppladdningen: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field.file_name().unwrap_or("fil").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::field("file", format!("Kunde inte läsa filen: {}", e)))?;
                file = Some((filename, content_type, data.to_vec()));
            }
            "alt" | "alt_text" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::field("alt_text", format!("Ogiltig alt-text: {}", e)))?;
                alt_text = Some(text);
            }
            _ => continue,
        }
    }

    let (filename, content_type, bytes) = file.ok_or_else(|| ApiError::field("file", "Ingen fil skickades"))?;
    let media = state
        .media_service
        .upload(&user, &filename, &content_type, bytes, alt_text)
        .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

async fn presign(
    State(state): State<AppState>,
    Json(body): Json<PresignRequest>,
) -> Result<Json<PresignedUpload>, ApiError> {
    Ok(Json(state.media_service.presign_upload(&body.filename, &body.content_type).await?))
}

async fn register(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let media = state
        .media_service
        .register_uploaded(&user, &body.key, &body.filename, &body.content_type, body.alt_text)
        .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

async fn list_media(
    State(state): State<AppState>,
    Query(q): Query<PaginationQuery>,
) -> Result<Json<MediaList>, ApiError> {
    Ok(Json(state.media_service.list(q.page, q.per_page).await?))
}

async fn get_media(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<MediaWithUrls>, ApiError> {
    Ok(Json(state.media_service.get(id).await?))
}

async fn update_alt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AltRequest>,
) -> Result<Json<MediaWithUrls>, ApiError> {
    Ok(Json(state.media_service.update_alt(id, body.alt_text).await?))
}

async fn delete_media(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.media_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
