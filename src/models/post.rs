//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PublishStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// Author user ID; cleared if the author is deleted
    pub author_id: Option<i64>,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    /// Markdown source
    pub content: String,
    pub content_html: String,
    pub status: PublishStatus,
    /// Set the first time the post is published
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: Option<PublishStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub status: Option<PublishStatus>,
}
