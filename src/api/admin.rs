//! Admin dashboard
//!
//! - GET /api/v1/admin/dashboard - Summary counts for the start page

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{OrderStatus, SubmissionStatus};

/// Response for dashboard stats
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_users: i64,
    pub total_pages: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    pub new_submissions: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let (total_users, total_pages, total_products, total_orders, pending_orders, new_submissions) = tokio::try_join!(
        async { state.user_service.count().await.map_err(ApiError::from) },
        async { state.page_service.count().await.map_err(ApiError::from) },
        async { state.content_service.count_products().await.map_err(ApiError::from) },
        async { state.account_service.count_orders(None).await.map_err(ApiError::from) },
        async { state.account_service.count_orders(Some(OrderStatus::Pending)).await.map_err(ApiError::from) },
        async { state.form_service.count_by_status(SubmissionStatus::New).await.map_err(ApiError::from) },
    )?;

    Ok(Json(DashboardResponse {
        total_users,
        total_pages,
        total_products,
        total_orders,
        pending_orders,
        new_submissions,
    }))
}
