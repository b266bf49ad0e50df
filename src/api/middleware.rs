//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token from `Authorization: Bearer` or the `session` cookie)
//! - Authorization (minimum role per route group)
//! - The mandatory 2FA grace gate

use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::{IpAddr, SocketAddr};

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{User, UserRole};
use crate::services::two_factor::{is_exempt_path, setup_redirect};
use crate::services::GraceDecision;

pub const SESSION_COOKIE: &str = "session";

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Du måste logga in"))
    }
}

/// Best guess at the client address: the first proxy header, then the socket
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_headers = extract_ip_address(&parts.headers);
        let from_socket = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());
        Ok(ClientIp(from_headers.or(from_socket)))
    }
}

/// Checks X-Forwarded-For, then X-Real-IP
fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|ip| ip.trim().parse().ok()) {
            return Some(ip);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

/// Extract session token from request
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value for a new session, or one that clears it when `max_age` is 0
pub fn session_cookie(token: &str, max_age_seconds: i64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age_seconds.max(0)
    ))
    .map_err(ApiError::internal)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers()).ok_or_else(|| ApiError::unauthorized("Du måste logga in"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Sessionen har gått ut, logga in igen"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Role guard. Layer with `from_fn_with_state(UserRole::Editor, require_role)`
/// inside `require_auth`.
pub async fn require_role(State(min): State<UserRole>, request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Du måste logga in"))?;

    if !user.0.has_role(min) {
        tracing::debug!(user_id = user.0.id, role = %user.0.role, required = %min, "Insufficient role");
        return Err(ApiError::forbidden("Du saknar behörighet för detta"));
    }

    Ok(next.run(request).await)
}

/// Mandatory 2FA. Runs after `require_auth`: starts the grace period on
/// first sight and sends users whose grace period has run out to the setup
/// page, remembering where they were going.
pub async fn two_factor_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(AuthenticatedUser(user)) = request.extensions().get::<AuthenticatedUser>().cloned() else {
        return next.run(request).await;
    };

    // Nested routers see a stripped URI
    let original = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.clone())
        .unwrap_or_else(|| request.uri().clone());
    if is_exempt_path(original.path()) {
        return next.run(request).await;
    }

    match state.two_factor.enforce_grace(&user, Utc::now()).await {
        Ok(GraceDecision::Allow) | Ok(GraceDecision::InitializeGrace(_)) => next.run(request).await,
        Ok(GraceDecision::RequireSetup) => {
            let target = original
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| original.path().to_string());
            let location = setup_redirect(&state.config.security.two_factor_setup_path, &target);
            tracing::debug!(user_id = user.id, path = %original.path(), "2FA setup required");
            match HeaderValue::from_str(&location) {
                Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
                Err(e) => ApiError::internal(e).into_response(),
            }
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
