//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1`:
//! - public site routes (pages, categories, services, products, posts,
//!   testimonials, campaigns, contact form, auth)
//! - `/account` for signed-in customers
//! - `/admin/*` grouped by the minimum role they need
//!
//! Every signed-in group runs `require_auth`, then the 2FA gate, then the
//! role guard.

pub mod account;
pub mod admin;
pub mod auth;
pub mod campaigns;
pub mod categories;
pub mod common;
pub mod forms;
pub mod media;
pub mod middleware;
pub mod orders;
pub mod pages;
pub mod posts;
pub mod products;
pub mod responses;
pub mod services;
pub mod state;
pub mod testimonials;
pub mod users;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::models::UserRole;

pub use responses::ApiError;
pub use state::AppState;

/// Multipart overhead on top of the largest accepted file
const MULTIPART_SLACK: usize = 64 * 1024;

/// Wrap a route group in auth, the 2FA gate and an optional role guard.
/// Layers run outermost first: auth, gate, role.
fn protect(router: Router<AppState>, state: &AppState, min_role: Option<UserRole>) -> Router<AppState> {
    let router = match min_role {
        Some(role) => router.route_layer(axum_middleware::from_fn_with_state(role, middleware::require_role)),
        None => router,
    };
    router
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::two_factor_gate))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
}

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let upload_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_SLACK);

    // Admin, users, orders and the submission inbox
    let admin_routes = protect(
        Router::new()
            .nest("/admin", admin::router())
            .nest("/admin/users", users::router())
            .nest("/admin/orders", orders::router())
            .nest("/admin/submissions", forms::router()),
        &state,
        Some(UserRole::Admin),
    );

    // Site structure and catalogue
    let editor_routes = protect(
        Router::new()
            .nest("/admin/pages", pages::router())
            .nest("/admin/categories", categories::router())
            .nest("/admin/services", services::router())
            .nest("/admin/products", products::router())
            .nest("/admin/testimonials", testimonials::router())
            .nest("/admin/campaigns", campaigns::router()),
        &state,
        Some(UserRole::Editor),
    );

    let author_routes = protect(
        Router::new()
            .nest("/admin/posts", posts::router())
            .nest("/admin/media", media::router().layer(DefaultBodyLimit::max(upload_limit))),
        &state,
        Some(UserRole::Author),
    );

    // Any signed-in user
    let account_routes = protect(
        Router::new()
            .nest("/auth", auth::protected_router())
            .nest("/account", account::router()),
        &state,
        None,
    );

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::public_router())
        .nest("/pages", pages::public_router())
        .nest("/categories", categories::public_router())
        .nest("/services", services::public_router())
        .nest("/products", products::public_router())
        .nest("/posts", posts::public_router())
        .nest("/testimonials", testimonials::public_router())
        .nest("/campaigns", campaigns::public_router())
        .nest("/forms", forms::public_router())
        .merge(admin_routes)
        .merge(editor_routes)
        .merge(author_routes)
        .merge(account_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    // Cookie auth needs an explicit origin and credentials
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    crate::db::ping(&state.pool).await.map_err(ApiError::internal)?;
    Ok("ok")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::{create_test_pool, migrations};
    use crate::services::two_factor::setup_redirect;
    use crate::services::ObjectStorage;

    async fn app() -> (Router, AppState) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let state =
            AppState::build_with_storage(Config::default(), pool, Arc::new(ObjectStorage::in_memory())).unwrap();
        let router = build_router(state.clone(), "http://localhost:3000").unwrap();
        (router, state)
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, value)
    }

    async fn register(app: &Router, email: &str) -> (String, Value) {
        let (status, headers, body) = send(
            app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": email, "password": "hemligt-lösen", "display_name": "Testare" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert!(headers.get(header::SET_COOKIE).is_some());
        (body["token"].as_str().unwrap().to_string(), body["user"].clone())
    }

    #[tokio::test]
    async fn test_register_then_me() {
        let (app, _) = app().await;
        let (token, user) = register(&app, "forsta@example.se").await;
        assert_eq!(user["role"], "super_admin");

        let (status, _, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "forsta@example.se");
        assert_eq!(body["two_factor"]["enabled"], false);
    }

    #[tokio::test]
    async fn test_me_without_session_is_unauthorized() {
        let (app, _) = app().await;
        let (status, _, body) = send(&app, Method::GET, "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _, _) = send(&app, Method::GET, "/api/v1/auth/me", Some("nonsense"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_customer_is_forbidden_on_admin_routes() {
        let (app, _) = app().await;
        let (admin_token, _) = register(&app, "admin@example.se").await;
        let (customer_token, customer) = register(&app, "kund@example.se").await;
        assert_eq!(customer["role"], "customer");

        let (status, _, _) = send(&app, Method::GET, "/api/v1/admin/users", Some(&customer_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = send(&app, Method::GET, "/api/v1/admin/pages", Some(&customer_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(&app, Method::GET, "/api/v1/admin/users", Some(&admin_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn test_first_request_starts_grace_period() {
        let (app, state) = app().await;
        let (token, user) = register(&app, "ny@example.se").await;
        let id = user["id"].as_i64().unwrap();

        let (status, _, _) = send(&app, Method::GET, "/api/v1/account/addresses", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let expires: Option<chrono::DateTime<Utc>> =
            sqlx::query_scalar("SELECT two_factor_grace_expires_at FROM users WHERE id = ?")
                .bind(id)
                .fetch_one(&state.pool)
                .await
                .unwrap();
        let days = (expires.unwrap() - Utc::now()).num_days();
        assert!((29..=30).contains(&days), "grace ends in {} days", days);
    }

    #[tokio::test]
    async fn test_expired_grace_redirects_to_setup() {
        let (app, state) = app().await;
        let (token, user) = register(&app, "sen@example.se").await;
        sqlx::query("UPDATE users SET two_factor_grace_expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::days(1))
            .bind(user["id"].as_i64().unwrap())
            .execute(&state.pool)
            .await
            .unwrap();

        let (status, headers, _) =
            send(&app, Method::GET, "/api/v1/account/orders?sida=2", Some(&token), None).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let expected = setup_redirect(&state.config.security.two_factor_setup_path, "/api/v1/account/orders?sida=2");
        assert_eq!(headers.get(header::LOCATION).unwrap().to_str().unwrap(), expected);

        // Setup itself and `me` stay reachable
        let (status, _, _) = send(&app, Method::GET, "/api/v1/account/two-factor", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_page_hierarchy_over_http() {
        let (app, _) = app().await;
        let (token, _) = register(&app, "redaktor@example.se").await;

        let (status, _, parent) = send(
            &app,
            Method::POST,
            "/api/v1/admin/pages",
            Some(&token),
            Some(json!({ "title": "Om oss", "slug": "om-oss", "status": "published" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", parent);

        let (status, _, child) = send(
            &app,
            Method::POST,
            "/api/v1/admin/pages",
            Some(&token),
            Some(json!({ "title": "Team", "slug": "team", "parent_id": parent["id"], "status": "published" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(child["path"], "/om-oss/team");

        // Duplicate slug under the same parent
        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/admin/pages",
            Some(&token),
            Some(json!({ "title": "Team igen", "slug": "team", "parent_id": parent["id"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["fields"]["slug"].is_string());

        // Parent below its own child
        let uri = format!("/api/v1/admin/pages/{}", parent["id"]);
        let (status, _, body) =
            send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "parent_id": child["id"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["fields"]["parent_id"].is_string());

        // Rename cascades
        let (status, _, _) = send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "slug": "foretaget" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, page) = send(&app, Method::GET, "/api/v1/pages/foretaget/team", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["title"], "Team");

        let (status, _, body) = send(&app, Method::GET, "/api/v1/pages/om-oss/team", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_cors_origin_is_an_error() {
        let (_, state) = app().await;
        assert!(build_router(state, "bad\norigin").is_err());
    }
}
