//! Customer testimonial model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: i64,
    pub author_name: String,
    pub company: Option<String>,
    pub quote: String,
    /// 1 to 5
    pub rating: i32,
    pub published: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTestimonialInput {
    pub author_name: String,
    #[serde(default)]
    pub company: Option<String>,
    pub quote: String,
    #[serde(default = "default_rating")]
    pub rating: i32,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_rating() -> i32 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTestimonialInput {
    pub author_name: Option<String>,
    pub company: Option<String>,
    pub quote: Option<String>,
    pub rating: Option<i32>,
    pub published: Option<bool>,
    pub sort_order: Option<i32>,
}
