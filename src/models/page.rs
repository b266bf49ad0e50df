//! Page model
//!
//! Pages are hierarchical: a page's path is its parent's path plus its own
//! slug, so `/om-oss/kontakt` lives below `/om-oss`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication state shared by pages and blog posts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Draft,
    Published,
}

impl Default for PublishStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            _ => Err(anyhow::anyhow!("Invalid publish status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub slug: String,
    /// Materialized path (unique)
    pub path: String,
    /// Markdown source
    pub content: String,
    /// Rendered HTML
    pub content_html: String,
    pub meta_description: Option<String>,
    pub status: PublishStatus,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

/// Page with its child pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTree {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub path: String,
    pub status: PublishStatus,
    pub children: Vec<PageTree>,
}

impl PageTree {
    /// Build a forest from a flat list of pages
    pub fn build(pages: &[Page]) -> Vec<PageTree> {
        fn children_of(all: &[Page], parent: Option<i64>) -> Vec<PageTree> {
            let mut nodes: Vec<&Page> = all.iter().filter(|p| p.parent_id == parent).collect();
            nodes.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.title.cmp(&b.title)));
            nodes
                .into_iter()
                .map(|p| PageTree {
                    id: p.id,
                    title: p.title.clone(),
                    slug: p.slug.clone(),
                    path: p.path.clone(),
                    status: p.status,
                    children: children_of(all, Some(p.id)),
                })
                .collect()
        }
        children_of(pages, None)
    }
}

/// Input for creating a page
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePageInput {
    pub title: String,
    /// Derived from the title when omitted
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub status: Option<PublishStatus>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

/// Input for updating a page
///
/// `parent_id: Some(None)` moves the page to the root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePageInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    #[serde(deserialize_with = "super::double_option")]
    pub parent_id: Option<Option<i64>>,
    pub content: Option<String>,
    #[serde(deserialize_with = "super::double_option")]
    pub meta_description: Option<Option<String>>,
    pub status: Option<PublishStatus>,
    pub sort_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn page(id: i64, parent_id: Option<i64>, slug: &str) -> Page {
        Page {
            id,
            parent_id,
            title: slug.to_string(),
            slug: slug.to_string(),
            path: format!("/{}", slug),
            content: String::new(),
            content_html: String::new(),
            meta_description: None,
            status: PublishStatus::Draft,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_status_parse() {
        assert_eq!(PublishStatus::from_str("Published").unwrap(), PublishStatus::Published);
        assert!(PublishStatus::from_str("archived").is_err());
        assert_eq!(PublishStatus::default(), PublishStatus::Draft);
    }

    #[test]
    fn test_page_tree_nesting() {
        let pages = vec![page(1, None, "om-oss"), page(2, Some(1), "kontakt"), page(3, None, "hem")];
        let tree = PageTree::build(&pages);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].slug, "hem");
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(tree[1].children[0].id, 2);
    }
}
