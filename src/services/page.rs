//! Page service
//!
//! Hierarchical CMS pages. The materialized path is what public requests
//! resolve, so renames and moves rewrite the paths of the whole subtree.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::PageRepository;
use crate::models::{CreatePageInput, Page, PageTree, PublishStatus, UpdatePageInput};
use crate::services::hierarchy::{
    compute_path, find_path_conflict, plan_cascade, slugify, validate_slug, HierarchyError,
};
use crate::services::MarkdownRenderer;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const CACHE_KEY_PAGE_TREE: &str = "page:tree";
const CACHE_KEY_PAGE_PATH: &str = "page:path:";
const CACHE_PATTERN_PAGE: &str = "page:*";
const MAX_META_DESCRIPTION: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum PageServiceError {
    #[error("Sidan hittades inte: {0}")]
    NotFound(i64),

    #[error("Överordnad sida hittades inte: {0}")]
    ParentNotFound(i64),

    #[error("Sökvägen \"{0}\" används redan")]
    DuplicatePath(String),

    #[error("En sida kan inte flyttas under sig själv eller sina undersidor")]
    CircularReference,

    #[error("{field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<HierarchyError> for PageServiceError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::NodeNotFound(id) => Self::NotFound(id),
            HierarchyError::ParentNotFound(id) => Self::ParentNotFound(id),
            HierarchyError::Cycle { .. } => Self::CircularReference,
        }
    }
}

pub struct PageService {
    repo: Arc<dyn PageRepository>,
    cache: Arc<Cache>,
    markdown: MarkdownRenderer,
}

impl PageService {
    pub fn new(repo: Arc<dyn PageRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            cache,
            markdown: MarkdownRenderer::new(),
        }
    }

    pub async fn create(&self, input: CreatePageInput) -> Result<Page, PageServiceError> {
        let title = validate_title(&input.title)?;
        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => slug.to_string(),
            None => slugify(&title),
        };
        validate_slug(&slug).map_err(|message| PageServiceError::ValidationError { field: "slug", message })?;
        validate_meta(input.meta_description.as_deref())?;

        let parent_path = match input.parent_id {
            Some(parent_id) => Some(
                self.repo
                    .get_by_id(parent_id)
                    .await
                    .context("Failed to get parent page")?
                    .ok_or(PageServiceError::ParentNotFound(parent_id))?
                    .path,
            ),
            None => None,
        };
        let path = compute_path(parent_path.as_deref(), &slug);
        if self.repo.exists_by_path(&path).await.context("Failed to check path uniqueness")? {
            return Err(PageServiceError::DuplicatePath(path));
        }

        let now = Utc::now();
        let page = Page {
            id: 0,
            parent_id: input.parent_id,
            title,
            slug,
            path: path.clone(),
            content_html: self.markdown.render(&input.content),
            content: input.content,
            meta_description: input.meta_description.filter(|m| !m.trim().is_empty()),
            status: input.status.unwrap_or_default(),
            sort_order: input.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&page).await.map_err(|e| {
            if is_unique_violation(&e) {
                PageServiceError::DuplicatePath(path)
            } else {
                e.into()
            }
        })?;

        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Page, PageServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get page")?
            .ok_or(PageServiceError::NotFound(id))
    }

    /// Published page at `path`; drafts are invisible to the public site
    pub async fn get_published_by_path(&self, path: &str) -> Result<Option<Page>, PageServiceError> {
        let path = normalize_path(path);
        let cache_key = format!("{}{}", CACHE_KEY_PAGE_PATH, path);
        if let Some(page) = self.cache.get::<Page>(&cache_key).await.ok().flatten() {
            return Ok(Some(page));
        }

        let page = self
            .repo
            .get_by_path(&path)
            .await
            .context("Failed to get page by path")?
            .filter(Page::is_published);

        if let Some(ref p) = page {
            let _ = self.cache.set(&cache_key, p, self.cache.default_ttl()).await;
        }
        Ok(page)
    }

    pub async fn list(&self) -> Result<Vec<Page>, PageServiceError> {
        Ok(self.repo.list().await.context("Failed to list pages")?)
    }

    pub async fn list_published(&self) -> Result<Vec<Page>, PageServiceError> {
        Ok(self.repo.list_published().await.context("Failed to list published pages")?)
    }

    /// Admin tree including drafts
    pub async fn tree(&self) -> Result<Vec<PageTree>, PageServiceError> {
        if let Some(tree) = self.cache.get::<Vec<PageTree>>(CACHE_KEY_PAGE_TREE).await.ok().flatten() {
            return Ok(tree);
        }
        let pages = self.repo.list().await.context("Failed to list pages")?;
        let tree = PageTree::build(&pages);
        let _ = self.cache.set(CACHE_KEY_PAGE_TREE, &tree, self.cache.default_ttl()).await;
        Ok(tree)
    }

    /// Update a page; slug or parent changes cascade to every descendant
    pub async fn update(&self, id: i64, input: UpdatePageInput) -> Result<Page, PageServiceError> {
        let mut page = self.get_by_id(id).await?;

        if let Some(title) = input.title {
            page.title = validate_title(&title)?;
        }
        let new_slug = match input.slug {
            Some(slug) => {
                let slug = slug.trim().to_string();
                validate_slug(&slug).map_err(|message| PageServiceError::ValidationError { field: "slug", message })?;
                slug
            }
            None => page.slug.clone(),
        };
        let new_parent_id = input.parent_id.unwrap_or(page.parent_id);

        let nodes = self.repo.tree_nodes().await.context("Failed to load page hierarchy")?;
        let changes = plan_cascade(&nodes, id, new_parent_id, &new_slug)?;
        if let Some(conflict) = find_path_conflict(&nodes, &changes) {
            return Err(PageServiceError::DuplicatePath(conflict.new_path.clone()));
        }

        if let Some(own) = changes.iter().find(|c| c.id == id) {
            page.path = own.new_path.clone();
        }
        page.slug = new_slug;
        page.parent_id = new_parent_id;

        if let Some(content) = input.content {
            page.content_html = self.markdown.render(&content);
            page.content = content;
        }
        if let Some(meta) = input.meta_description {
            validate_meta(meta.as_deref())?;
            page.meta_description = meta.filter(|m| !m.trim().is_empty());
        }
        if let Some(status) = input.status {
            page.status = status;
        }
        if let Some(sort_order) = input.sort_order {
            page.sort_order = sort_order;
        }

        let updated = self.repo.update_with_cascade(&page, &changes).await.map_err(|e| {
            if is_unique_violation(&e) {
                PageServiceError::DuplicatePath(page.path.clone())
            } else {
                e.into()
            }
        })?;

        self.invalidate_cache().await;
        if changes.len() > 1 {
            tracing::info!(page_id = id, moved = changes.len(), "Page subtree paths updated");
        }
        Ok(updated)
    }

    pub async fn set_status(&self, id: i64, status: PublishStatus) -> Result<Page, PageServiceError> {
        self.update(id, UpdatePageInput { status: Some(status), ..Default::default() }).await
    }

    /// Delete a page; its children move up to its parent
    pub async fn delete(&self, id: i64) -> Result<(), PageServiceError> {
        let page = self.get_by_id(id).await?;
        let snapshot = self.repo.tree_nodes().await.context("Failed to load page hierarchy")?;
        let children: Vec<(i64, String)> = snapshot
            .iter()
            .filter(|n| n.parent_id == Some(id))
            .map(|n| (n.id, n.slug.clone()))
            .collect();

        let nodes: Vec<_> = snapshot
            .into_iter()
            .filter(|n| n.id != id)
            .map(|mut n| {
                if n.parent_id == Some(id) {
                    n.parent_id = page.parent_id;
                }
                n
            })
            .collect();

        let mut changes = Vec::new();
        for (child_id, slug) in &children {
            changes.extend(plan_cascade(&nodes, *child_id, page.parent_id, slug)?);
        }
        if let Some(conflict) = find_path_conflict(&nodes, &changes) {
            return Err(PageServiceError::DuplicatePath(conflict.new_path.clone()));
        }

        self.repo
            .delete_and_reparent(id, page.parent_id, &changes)
            .await
            .context("Failed to delete page")?;

        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, PageServiceError> {
        Ok(self.repo.count().await.context("Failed to count pages")?)
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern(CACHE_PATTERN_PAGE).await;
    }
}

fn validate_title(title: &str) -> Result<String, PageServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PageServiceError::ValidationError {
            field: "title",
            message: "Titel måste anges".to_string(),
        });
    }
    if title.chars().count() > 200 {
        return Err(PageServiceError::ValidationError {
            field: "title",
            message: "Titeln får vara högst 200 tecken".to_string(),
        });
    }
    Ok(title.to_string())
}

fn validate_meta(meta: Option<&str>) -> Result<(), PageServiceError> {
    if meta.is_some_and(|m| m.chars().count() > MAX_META_DESCRIPTION) {
        return Err(PageServiceError::ValidationError {
            field: "meta_description",
            message: format!("Metabeskrivningen får vara högst {} tecken", MAX_META_DESCRIPTION),
        });
    }
    Ok(())
}

/// `om-oss/kontakt/` and `/om-oss/kontakt` resolve to the same page
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxPageRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> PageService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        PageService::new(SqlxPageRepository::boxed(pool), Arc::new(MemoryCache::new()))
    }

    fn input(title: &str, parent_id: Option<i64>) -> CreatePageInput {
        CreatePageInput {
            title: title.to_string(),
            slug: None,
            parent_id,
            content: "# Rubrik".to_string(),
            meta_description: None,
            status: Some(PublishStatus::Published),
            sort_order: None,
        }
    }

    #[tokio::test]
    async fn test_create_renders_markdown_and_path() {
        let svc = setup().await;
        let about = svc.create(input("Om oss", None)).await.unwrap();
        let contact = svc.create(input("Kontakt", Some(about.id))).await.unwrap();

        assert_eq!(about.path, "/om-oss");
        assert_eq!(contact.path, "/om-oss/kontakt");
        assert!(contact.content_html.contains("<h1>Rubrik</h1>"));
    }

    #[tokio::test]
    async fn test_same_slug_allowed_under_other_parent_but_not_same() {
        let svc = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", None)).await.unwrap();
        svc.create(input("Kontakt", Some(a.id))).await.unwrap();
        svc.create(input("Kontakt", Some(b.id))).await.unwrap();

        assert!(matches!(
            svc.create(input("Kontakt", Some(a.id))).await,
            Err(PageServiceError::DuplicatePath(p)) if p == "/a/kontakt"
        ));
    }

    #[tokio::test]
    async fn test_move_conflict_rejected_before_write() {
        let svc = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", None)).await.unwrap();
        svc.create(input("Team", Some(a.id))).await.unwrap();
        let team_b = svc.create(input("Team", Some(b.id))).await.unwrap();

        let result = svc
            .update(team_b.id, UpdatePageInput { parent_id: Some(Some(a.id)), title: Some("Nytt".into()), ..Default::default() })
            .await;
        assert!(matches!(result, Err(PageServiceError::DuplicatePath(_))));
        assert_eq!(svc.get_by_id(team_b.id).await.unwrap().title, "Team");
    }

    #[tokio::test]
    async fn test_rename_cascades_and_published_lookup() {
        let svc = setup().await;
        let a = svc.create(input("Om oss", None)).await.unwrap();
        let child = svc.create(input("Team", Some(a.id))).await.unwrap();
        let grandchild = svc.create(input("Ledning", Some(child.id))).await.unwrap();

        // Prime the path cache, then make sure the rename invalidates it
        assert!(svc.get_published_by_path("/om-oss/team/ledning").await.unwrap().is_some());

        svc.update(a.id, UpdatePageInput { slug: Some("foretaget".into()), ..Default::default() })
            .await
            .unwrap();

        assert!(svc.get_published_by_path("/om-oss/team/ledning").await.unwrap().is_none());
        let found = svc.get_published_by_path("foretaget/team/ledning/").await.unwrap().unwrap();
        assert_eq!(found.id, grandchild.id);
    }

    #[tokio::test]
    async fn test_drafts_hidden_and_cycle_rejected() {
        let svc = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", Some(a.id))).await.unwrap();
        svc.set_status(b.id, PublishStatus::Draft).await.unwrap();
        assert!(svc.get_published_by_path("/a/b").await.unwrap().is_none());

        let result = svc.update(a.id, UpdatePageInput { parent_id: Some(Some(b.id)), ..Default::default() }).await;
        assert!(matches!(result, Err(PageServiceError::CircularReference)));
    }

    #[tokio::test]
    async fn test_tree_is_served_from_cache() {
        let svc = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        svc.create(input("B", Some(a.id))).await.unwrap();

        let built = svc.tree().await.unwrap();
        let cached = svc.cache.get::<Vec<PageTree>>(CACHE_KEY_PAGE_TREE).await.unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].children[0].path, built[0].children[0].path);
        assert_eq!(svc.tree().await.unwrap()[0].children.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_lifts_children() {
        let svc = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", Some(a.id))).await.unwrap();
        let c = svc.create(input("C", Some(b.id))).await.unwrap();

        svc.delete(b.id).await.unwrap();
        let c = svc.get_by_id(c.id).await.unwrap();
        assert_eq!(c.parent_id, Some(a.id));
        assert_eq!(c.path, "/a/c");

        let tree = svc.tree().await.unwrap();
        assert_eq!(tree[0].children[0].id, c.id);
        assert_eq!(svc.count().await.unwrap(), 2);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("om-oss/"), "/om-oss");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(" /a/b "), "/a/b");
    }
}
