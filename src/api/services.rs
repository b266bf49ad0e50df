//! Service catalogue endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{CreateServiceInput, Service, UpdateServiceInput};
use crate::services::page::normalize_path;

#[derive(Debug, Deserialize)]
pub struct ServiceFilter {
    pub category_id: Option<i64>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{*path}", get(get_by_path))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route("/{id}", get(get_service).put(update_service).delete(delete_service))
}

async fn list_published(
    State(state): State<AppState>,
    Query(filter): Query<ServiceFilter>,
) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(state.service_catalog.list_published(filter.category_id).await?))
}

/// GET /api/v1/services/it/drift
async fn get_by_path(State(state): State<AppState>, Path(path): Path<String>) -> Result<Json<Service>, ApiError> {
    state
        .service_catalog
        .get_published_by_path(&normalize_path(&path))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Tjänsten finns inte"))
}

async fn list_services(
    State(state): State<AppState>,
    Query(filter): Query<ServiceFilter>,
) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(state.service_catalog.list(filter.category_id).await?))
}

async fn get_service(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.service_catalog.get_by_id(id).await?))
}

async fn create_service(
    State(state): State<AppState>,
    Json(input): Json<CreateServiceInput>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.service_catalog.create(input).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateServiceInput>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.service_catalog.update(id, input).await?))
}

async fn delete_service(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.service_catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
