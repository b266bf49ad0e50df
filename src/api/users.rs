//! User administration (admin and up)
//!
//! Granting or revoking admin rights is checked again in the user service,
//! where only a super admin may do it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::AuthenticatedUser;
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{CreateUserInput, UpdateUserInput, User, UserRole};
use crate::services::user::UserList;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/{id}/role", put(change_role))
        .route("/{id}/ban", put(set_banned))
}

async fn list_users(State(state): State<AppState>, Query(q): Query<UserQuery>) -> Result<Json<UserList>, ApiError> {
    Ok(Json(state.user_service.list(q.page, q.per_page, q.role).await?))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.get_by_id(id).await?))
}

async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.create_user(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update_user(&actor, id, input).await?))
}

async fn change_role(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.change_role(&actor, id, body.role).await?))
}

async fn set_banned(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<BanRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.set_banned(&actor, id, body.banned).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
