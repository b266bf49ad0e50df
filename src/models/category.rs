//! Category model
//!
//! Categories form a tree that groups the service catalogue. Each category
//! stores its materialized path (`/parent-slug/slug`), which is also the
//! prefix of every service path below it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Materialized path, e.g. `/it-tjanster/drift`
    pub path: String,
    pub description: Option<String>,
    /// Sort order within parent
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Category with its children for tree representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryTree>,
}

impl CategoryTree {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            children: Vec::new(),
        }
    }

    /// Build a forest from a flat list, ordering siblings by sort order then name
    pub fn build(categories: &[Category]) -> Vec<CategoryTree> {
        fn children_of(all: &[Category], parent: Option<i64>) -> Vec<CategoryTree> {
            let mut nodes: Vec<&Category> = all.iter().filter(|c| c.parent_id == parent).collect();
            nodes.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
            nodes
                .into_iter()
                .map(|c| CategoryTree {
                    category: c.clone(),
                    children: children_of(all, Some(c.id)),
                })
                .collect()
        }
        children_of(categories, None)
    }

    /// Total count of this category and all descendants
    pub fn total_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.total_count()).sum::<usize>()
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i32>,
}

/// Input for updating a category
///
/// `parent_id: Some(None)` moves the category to the root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(deserialize_with = "super::double_option")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "super::double_option")]
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
}
