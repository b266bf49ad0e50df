//! Order handling for staff (admin and up)

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{Order, OrderStatus};
use crate::services::account::OrderList;

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/status", put(update_status))
}

async fn list_orders(State(state): State<AppState>, Query(q): Query<OrderQuery>) -> Result<Json<OrderList>, ApiError> {
    Ok(Json(state.account_service.list_all_orders(q.status, q.page, q.per_page).await?))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.account_service.get_any_order(id).await?))
}

/// Only forward moves along the order lifecycle, or cancellation before shipping
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.account_service.update_order_status(id, body.status).await?))
}
