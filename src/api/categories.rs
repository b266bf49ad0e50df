//! Category API endpoints
//!
//! - GET /api/v1/categories - Category tree
//! - GET /api/v1/categories/{*path} - One category with its published services
//! - /api/v1/admin/categories - Editor CRUD; renames and moves cascade

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{Category, CategoryTree, CreateCategoryInput, Service, UpdateCategoryInput};
use crate::services::page::normalize_path;

/// Response for the category tree
#[derive(Debug, Serialize)]
pub struct CategoryTreeResponse {
    pub categories: Vec<CategoryTree>,
}

#[derive(Debug, Serialize)]
pub struct CategoryDetailResponse {
    pub category: Category,
    pub services: Vec<Service>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_tree))
        .route("/{*path}", get(get_by_path))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/tree", get(get_tree))
        .route("/{id}", get(get_category).put(update_category).delete(delete_category))
}

async fn get_tree(State(state): State<AppState>) -> Result<Json<CategoryTreeResponse>, ApiError> {
    let categories = state.category_service.list_tree().await?;
    Ok(Json(CategoryTreeResponse { categories }))
}

async fn get_by_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<CategoryDetailResponse>, ApiError> {
    let category = state
        .category_service
        .get_by_path(&normalize_path(&path))
        .await?
        .ok_or_else(|| ApiError::not_found("Kategorin finns inte"))?;
    let services = state.service_catalog.list_published(Some(category.id)).await?;
    Ok(Json(CategoryDetailResponse { category, services }))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}

async fn get_category(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.get_by_id(id).await?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.category_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, input).await?))
}

async fn delete_category(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
