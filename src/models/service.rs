//! Service model (an offering listed under a category)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    /// Unique slug
    pub slug: String,
    /// `category.path + "/" + slug`, kept in sync when the category moves
    pub path: String,
    pub summary: Option<String>,
    pub content: String,
    pub content_html: String,
    pub published: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceInput {
    pub category_id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateServiceInput {
    pub category_id: Option<i64>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
    pub sort_order: Option<i32>,
}
