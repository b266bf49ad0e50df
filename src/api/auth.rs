//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Customer registration (first user becomes super admin)
//! - POST /api/v1/auth/login - Password step; returns a session or a 2FA challenge
//! - POST /api/v1/auth/login/two-factor - Second step with challenge and code
//! - POST /api/v1/auth/logout - End the current session
//! - GET /api/v1/auth/me - Current user and 2FA status

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, session_cookie, AuthenticatedUser, ClientIp};
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{Session, User};
use crate::services::two_factor::TwoFactorStatus;
use crate::services::{LoginInput, LoginOutcome, RegisterInput};

#[derive(Debug, Deserialize)]
pub struct TwoFactorLoginRequest {
    pub challenge: String,
    pub code: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Authenticated { user: User, token: String },
    TwoFactorRequired { challenge: String },
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub two_factor: TwoFactorStatus,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/login/two-factor", post(login_two_factor))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

fn with_session_cookie<T: Serialize>(status: StatusCode, session: &Session, body: T) -> Result<impl IntoResponse, ApiError> {
    let max_age = (session.expires_at - Utc::now()).num_seconds();
    let cookie = session_cookie(&session.id, max_age)?;
    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let email = body.email.clone();
    state.user_service.register(body).await?;

    // Log straight in; a fresh account has no 2FA yet
    match state.user_service.login(LoginInput { email, password }, ip).await? {
        LoginOutcome::Authenticated { user, session } => with_session_cookie(
            StatusCode::CREATED,
            &session,
            AuthResponse { user, token: session.id.clone() },
        ),
        LoginOutcome::TwoFactorRequired { .. } => Err(ApiError::internal("New account unexpectedly requires 2FA")),
    }
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<axum::response::Response, ApiError> {
    match state.user_service.login(body, ip).await? {
        LoginOutcome::Authenticated { user, session } => {
            tracing::info!(user_id = user.id, "User logged in");
            let token = session.id.clone();
            Ok(with_session_cookie(StatusCode::OK, &session, LoginResponse::Authenticated { user, token })?
                .into_response())
        }
        LoginOutcome::TwoFactorRequired { challenge } => {
            Ok(Json(LoginResponse::TwoFactorRequired { challenge }).into_response())
        }
    }
}

/// POST /api/v1/auth/login/two-factor
async fn login_two_factor(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<TwoFactorLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state
        .user_service
        .complete_two_factor_login(&body.challenge, body.code.trim(), ip)
        .await?;
    tracing::info!(user_id = user.id, "User logged in with 2FA");
    let token = session.id.clone();
    with_session_cookie(StatusCode::OK, &session, AuthResponse { user, token })
}

/// POST /api/v1/auth/logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, session_cookie("", 0)?)]))
}

/// GET /api/v1/auth/me
async fn me(State(state): State<AppState>, AuthenticatedUser(user): AuthenticatedUser) -> Result<Json<MeResponse>, ApiError> {
    let two_factor = state.two_factor.status(&user).await?;
    Ok(Json(MeResponse { user, two_factor }))
}
