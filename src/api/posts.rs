//! Blog post endpoints
//!
//! Public listing shows published posts only; authors manage posts under
//! `/admin/posts`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::common::{Paginated, PaginationQuery};
use crate::api::middleware::AuthenticatedUser;
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{CreatePostInput, Post, UpdatePostInput};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{slug}", get(get_by_slug))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
}

async fn list_published(
    State(state): State<AppState>,
    Query(q): Query<PaginationQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    let (page, per_page) = q.clamped();
    let (items, total) = state.content_service.list_posts(page, per_page, true).await?;
    Ok(Json(Paginated::new(items, total, page, per_page)))
}

async fn get_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.content_service.get_published_post(&slug).await?))
}

async fn list_posts(
    State(state): State<AppState>,
    Query(q): Query<PaginationQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    let (page, per_page) = q.clamped();
    let (items, total) = state.content_service.list_posts(page, per_page, false).await?;
    Ok(Json(Paginated::new(items, total, page, per_page)))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.content_service.get_post(id).await?))
}

async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.content_service.create_post(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.content_service.update_post(id, input).await?))
}

async fn delete_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.content_service.delete_post(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
