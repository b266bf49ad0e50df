//! Pages API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{CreatePageInput, Page, PageTree, PublishStatus, UpdatePageInput};

/// Editor routes, nested under `/admin/pages`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pages).post(create_page))
        .route("/tree", get(page_tree))
        .route("/{id}", get(get_page).put(update_page).delete(delete_page))
        .route("/{id}/status", put(set_status))
}

/// Public routes, nested under `/pages`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published_pages))
        .route("/{*path}", get(get_page_by_path))
}

#[derive(Serialize)]
struct PagesResponse {
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct StatusRequest {
    status: PublishStatus,
}

async fn list_pages(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pages = state.page_service.list().await?;
    Ok(Json(PagesResponse { pages }))
}

async fn page_tree(State(state): State<AppState>) -> Result<Json<Vec<PageTree>>, ApiError> {
    Ok(Json(state.page_service.tree().await?))
}

async fn list_published_pages(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pages = state.page_service.list_published().await?;
    Ok(Json(PagesResponse { pages }))
}

async fn get_page(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Page>, ApiError> {
    Ok(Json(state.page_service.get_by_id(id).await?))
}

/// GET /api/v1/pages/om-oss/team
async fn get_page_by_path(State(state): State<AppState>, Path(path): Path<String>) -> Result<Json<Page>, ApiError> {
    state
        .page_service
        .get_published_by_path(&path)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sidan finns inte"))
}

async fn create_page(
    State(state): State<AppState>,
    Json(input): Json<CreatePageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.page_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePageInput>,
) -> Result<Json<Page>, ApiError> {
    Ok(Json(state.page_service.update(id, input).await?))
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Page>, ApiError> {
    Ok(Json(state.page_service.set_status(id, body.status).await?))
}

async fn delete_page(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.page_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
