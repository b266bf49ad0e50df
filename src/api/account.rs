//! Customer account API
//!
//! Everything here is behind `require_auth` and the 2FA gate; the
//! `/two-factor` routes are exempt from the gate so users can set it up.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::ok;
use crate::api::middleware::AuthenticatedUser;
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{Address, AddressInput, Order, PlaceOrderInput, User};
use crate::services::two_factor::{TwoFactorSetup, TwoFactorStatus};

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
        .route("/two-factor", get(two_factor_status))
        .route("/two-factor/setup", post(begin_setup))
        .route("/two-factor/confirm", post(confirm_setup))
        .route("/two-factor/disable", post(disable_two_factor))
        .route("/two-factor/backup-codes", post(regenerate_backup_codes))
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/{id}", get(get_address).put(update_address).delete(delete_address))
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/{id}", get(get_order))
}

/// PUT /api/v1/account/profile
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update_profile(&user, &body.display_name).await?))
}

/// PUT /api/v1/account/password
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<PasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .user_service
        .change_password(&user, &body.current_password, &body.new_password)
        .await?;
    Ok(ok())
}

// ============================================================================
// Two-factor authentication
// ============================================================================

async fn two_factor_status(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TwoFactorStatus>, ApiError> {
    Ok(Json(state.two_factor.status(&user).await?))
}

async fn begin_setup(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TwoFactorSetup>, ApiError> {
    Ok(Json(state.two_factor.begin_setup(&user).await?))
}

async fn confirm_setup(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CodeRequest>,
) -> Result<Json<BackupCodesResponse>, ApiError> {
    let backup_codes = state.two_factor.confirm_setup(&user, body.code.trim()).await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

async fn disable_two_factor(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.two_factor.disable(&user, body.code.trim()).await?;
    Ok(ok())
}

async fn regenerate_backup_codes(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CodeRequest>,
) -> Result<Json<BackupCodesResponse>, ApiError> {
    let backup_codes = state.two_factor.regenerate_backup_codes(&user, body.code.trim()).await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

// ============================================================================
// Addresses
// ============================================================================

async fn list_addresses(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(state.account_service.list_addresses(&user).await?))
}

async fn create_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<AddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state.account_service.create_address(&user, body).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn get_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Address>, ApiError> {
    Ok(Json(state.account_service.get_address(&user, id).await?))
}

async fn update_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<AddressInput>,
) -> Result<Json<Address>, ApiError> {
    Ok(Json(state.account_service.update_address(&user, id, body).await?))
}

async fn delete_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.account_service.delete_address(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Orders
// ============================================================================

async fn list_orders(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.account_service.list_orders(&user).await?))
}

async fn place_order(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.account_service.place_order(&user, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.account_service.get_order(&user, id).await?))
}
