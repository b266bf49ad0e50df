//! Testimonial endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{CreateTestimonialInput, Testimonial, UpdateTestimonialInput};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_published))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_testimonials).post(create_testimonial))
        .route("/{id}", get(get_testimonial).put(update_testimonial).delete(delete_testimonial))
}

async fn list_published(State(state): State<AppState>) -> Result<Json<Vec<Testimonial>>, ApiError> {
    Ok(Json(state.content_service.list_published_testimonials().await?))
}

async fn list_testimonials(State(state): State<AppState>) -> Result<Json<Vec<Testimonial>>, ApiError> {
    Ok(Json(state.content_service.list_testimonials().await?))
}

async fn get_testimonial(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Testimonial>, ApiError> {
    Ok(Json(state.content_service.get_testimonial(id).await?))
}

async fn create_testimonial(
    State(state): State<AppState>,
    Json(input): Json<CreateTestimonialInput>,
) -> Result<impl IntoResponse, ApiError> {
    let testimonial = state.content_service.create_testimonial(input).await?;
    Ok((StatusCode::CREATED, Json(testimonial)))
}

async fn update_testimonial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateTestimonialInput>,
) -> Result<Json<Testimonial>, ApiError> {
    Ok(Json(state.content_service.update_testimonial(id, input).await?))
}

async fn delete_testimonial(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.content_service.delete_testimonial(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
