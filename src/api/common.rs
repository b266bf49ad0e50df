//! Common API utilities and shared types

use serde::{Deserialize, Serialize};

/// Default page number (1-indexed)
pub fn default_page() -> i64 {
    1
}

/// Default page size for listings
pub fn default_per_page() -> i64 {
    20
}

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

impl PaginationQuery {
    /// Page from 1, at most 100 per page
    pub fn clamped(&self) -> (i64, i64) {
        (self.page.max(1), self.per_page.clamp(1, 100))
    }
}

/// Paginated list with totals
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

/// `{ "ok": true }`
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub fn ok() -> axum::Json<OkResponse> {
    axum::Json(OkResponse { ok: true })
}
