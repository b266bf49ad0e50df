//! Product catalogue endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{CreateProductInput, Product, UpdateProductInput};

/// Active products only
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_active))
        .route("/{slug}", get(get_by_slug))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/{id}", get(get_product).put(update_product).delete(delete_product))
}

async fn list_active(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.content_service.list_active_products().await?))
}

async fn get_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.content_service.get_active_product(&slug).await?))
}

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.content_service.list_products().await?))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.content_service.get_product(id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.content_service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.content_service.update_product(id, input).await?))
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.content_service.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
