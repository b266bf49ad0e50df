//! Category service
//!
//! Categories form the tree that the service catalogue hangs off. Every
//! category stores its materialized path, and every service stores
//! `category.path + "/" + service.slug`. Renaming or moving a category
//! therefore rewrites the paths of the whole subtree and of every service
//! below it; the plan is computed up front by [`crate::services::hierarchy`]
//! and written in one transaction.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{CategoryRepository, ServiceRepository};
use crate::models::{Category, CategoryTree, CreateCategoryInput, UpdateCategoryInput};
use crate::services::hierarchy::{
    compute_path, find_path_conflict, plan_cascade, plan_leaf_cascade, slugify, validate_slug,
    HierarchyError, PathChange,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const CACHE_KEY_CATEGORY_TREE: &str = "category:tree";
const CACHE_KEY_CATEGORY_LIST: &str = "category:list";
const CACHE_PATTERN_CATEGORY: &str = "category:*";
/// Service listings embed category paths
const CACHE_PATTERN_SERVICE: &str = "service:*";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Kategori hittades inte: {0}")]
    NotFound(i64),

    #[error("Överordnad kategori hittades inte: {0}")]
    ParentNotFound(i64),

    #[error("Sluggen \"{0}\" används redan")]
    DuplicateSlug(String),

    #[error("Sökvägen \"{0}\" används redan")]
    DuplicatePath(String),

    #[error("En kategori kan inte flyttas under sig själv eller sina underkategorier")]
    CircularReference,

    #[error("Kategorin har {0} tjänster och kan inte tas bort")]
    HasServices(i64),

    #[error("{field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<HierarchyError> for CategoryServiceError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::NodeNotFound(id) => Self::NotFound(id),
            HierarchyError::ParentNotFound(id) => Self::ParentNotFound(id),
            HierarchyError::Cycle { .. } => Self::CircularReference,
        }
    }
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    services: Arc<dyn ServiceRepository>,
    cache: Arc<Cache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, services: Arc<dyn ServiceRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, services, cache }
    }

    /// Create a category below `parent_id` (or at the root).
    ///
    /// # Errors
    /// - `ValidationError` for an empty name or malformed slug
    /// - `ParentNotFound` if the parent does not exist
    /// - `DuplicateSlug` / `DuplicatePath` on uniqueness violations
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError {
                field: "name",
                message: "Namn måste anges".to_string(),
            });
        }

        let slug = resolve_slug(input.slug.as_deref(), &name)?;

        let parent_path = match input.parent_id {
            Some(parent_id) => Some(
                self.repo
                    .get_by_id(parent_id)
                    .await
                    .context("Failed to get parent category")?
                    .ok_or(CategoryServiceError::ParentNotFound(parent_id))?
                    .path,
            ),
            None => None,
        };
        let path = compute_path(parent_path.as_deref(), &slug);

        if self.repo.exists_by_slug(&slug).await.context("Failed to check slug uniqueness")? {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }
        if self.repo.exists_by_path(&path).await.context("Failed to check path uniqueness")? {
            return Err(CategoryServiceError::DuplicatePath(path));
        }

        let now = Utc::now();
        let category = Category {
            id: 0,
            parent_id: input.parent_id,
            name,
            slug: slug.clone(),
            path,
            description: input.description.filter(|d| !d.trim().is_empty()),
            sort_order: input.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&category).await.map_err(|e| {
            if is_unique_violation(&e) {
                CategoryServiceError::DuplicateSlug(slug)
            } else {
                e.into()
            }
        })?;

        self.invalidate_cache().await;
        tracing::info!(category_id = created.id, path = %created.path, "Category created");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_path(path).await.context("Failed to get category by path")?)
    }

    /// Flat list ordered by path
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Some(list) = self.cache.get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST).await.ok().flatten() {
            return Ok(list);
        }

        let list = self.repo.list().await.context("Failed to list categories")?;
        let _ = self.cache.set(CACHE_KEY_CATEGORY_LIST, &list, self.cache.default_ttl()).await;
        Ok(list)
    }

    pub async fn list_tree(&self) -> Result<Vec<CategoryTree>, CategoryServiceError> {
        if let Some(tree) = self.cache.get::<Vec<CategoryTree>>(CACHE_KEY_CATEGORY_TREE).await.ok().flatten() {
            return Ok(tree);
        }

        let categories = self.repo.list().await.context("Failed to list categories")?;
        let tree = CategoryTree::build(&categories);
        let _ = self.cache.set(CACHE_KEY_CATEGORY_TREE, &tree, self.cache.default_ttl()).await;
        Ok(tree)
    }

    /// Update a category, cascading path changes to descendants and services.
    ///
    /// Cycles, unknown parents and path collisions are detected on a snapshot
    /// before anything is written.
    pub async fn update(&self, id: i64, input: UpdateCategoryInput) -> Result<Category, CategoryServiceError> {
        let mut category = self.get_by_id(id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CategoryServiceError::ValidationError {
                    field: "name",
                    message: "Namn måste anges".to_string(),
                });
            }
            category.name = name;
        }

        let new_slug = match input.slug {
            Some(slug) => {
                let slug = slug.trim().to_string();
                validate_slug(&slug).map_err(|message| CategoryServiceError::ValidationError { field: "slug", message })?;
                if slug != category.slug && self.repo.exists_by_slug(&slug).await.context("Failed to check slug uniqueness")? {
                    return Err(CategoryServiceError::DuplicateSlug(slug));
                }
                slug
            }
            None => category.slug.clone(),
        };
        let new_parent_id = input.parent_id.unwrap_or(category.parent_id);

        let nodes = self.repo.tree_nodes().await.context("Failed to load category hierarchy")?;
        let changes = plan_cascade(&nodes, id, new_parent_id, &new_slug)?;
        if let Some(conflict) = find_path_conflict(&nodes, &changes) {
            return Err(CategoryServiceError::DuplicatePath(conflict.new_path.clone()));
        }

        let service_changes = self.plan_service_changes(&changes).await?;

        if let Some(own) = changes.iter().find(|c| c.id == id) {
            category.path = own.new_path.clone();
        }
        category.slug = new_slug;
        category.parent_id = new_parent_id;
        if let Some(description) = input.description {
            category.description = description.filter(|d| !d.trim().is_empty());
        }
        if let Some(sort_order) = input.sort_order {
            category.sort_order = sort_order;
        }

        let updated = self
            .repo
            .update_with_cascade(&category, &changes, &service_changes)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CategoryServiceError::DuplicatePath(category.path.clone())
                } else {
                    e.into()
                }
            })?;

        self.invalidate_cache().await;
        if !changes.is_empty() {
            tracing::info!(
                category_id = id,
                categories = changes.len(),
                services = service_changes.len(),
                "Category paths updated"
            );
        }
        Ok(updated)
    }

    /// Delete a category. Its children move up to its parent and get new
    /// paths; a category that still has services cannot be deleted.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let category = self.get_by_id(id).await?;

        let service_count = self.services.count_by_category(id).await.context("Failed to count services")?;
        if service_count > 0 {
            return Err(CategoryServiceError::HasServices(service_count));
        }

        let snapshot = self.repo.tree_nodes().await.context("Failed to load category hierarchy")?;
        let children: Vec<(i64, String)> = snapshot
            .iter()
            .filter(|n| n.parent_id == Some(id))
            .map(|n| (n.id, n.slug.clone()))
            .collect();

        // Hierarchy as it will look once the row is gone
        let nodes: Vec<_> = snapshot
            .into_iter()
            .filter(|n| n.id != id)
            .map(|mut n| {
                if n.parent_id == Some(id) {
                    n.parent_id = category.parent_id;
                }
                n
            })
            .collect();

        let mut changes = Vec::new();
        for (child_id, slug) in &children {
            changes.extend(plan_cascade(&nodes, *child_id, category.parent_id, slug)?);
        }
        if let Some(conflict) = find_path_conflict(&nodes, &changes) {
            return Err(CategoryServiceError::DuplicatePath(conflict.new_path.clone()));
        }
        let service_changes = self.plan_service_changes(&changes).await?;

        self.repo
            .delete_and_reparent(id, category.parent_id, &changes, &service_changes)
            .await
            .context("Failed to delete category")?;

        self.invalidate_cache().await;
        tracing::info!(category_id = id, moved = changes.len(), "Category deleted");
        Ok(())
    }

    async fn plan_service_changes(&self, changes: &[PathChange]) -> Result<Vec<PathChange>, CategoryServiceError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let leaves = self.services.leaf_nodes().await.context("Failed to load service paths")?;
        let service_changes = plan_leaf_cascade(&leaves, changes);
        if let Some(conflict) = find_path_conflict(&leaves, &service_changes) {
            return Err(CategoryServiceError::DuplicatePath(conflict.new_path.clone()));
        }
        Ok(service_changes)
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern(CACHE_PATTERN_CATEGORY).await;
        let _ = self.cache.delete_pattern(CACHE_PATTERN_SERVICE).await;
    }
}

/// Explicit slug if given (validated), otherwise derived from `fallback`
pub(crate) fn resolve_slug(explicit: Option<&str>, fallback: &str) -> Result<String, CategoryServiceError> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(fallback),
    };
    validate_slug(&slug).map_err(|message| CategoryServiceError::ValidationError { field: "slug", message })?;
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxCategoryRepository, SqlxServiceRepository};
    use crate::db::{create_test_pool, migrations, DbPool};
    use crate::models::Service;

    async fn setup() -> (CategoryService, Arc<dyn ServiceRepository>, DbPool) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let services = SqlxServiceRepository::boxed(pool.clone());
        let service = CategoryService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            services.clone(),
            Arc::new(MemoryCache::new()),
        );
        (service, services, pool)
    }

    fn input(name: &str, parent_id: Option<i64>) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            slug: None,
            description: None,
            parent_id,
            sort_order: None,
        }
    }

    async fn add_service(repo: &Arc<dyn ServiceRepository>, category: &Category, slug: &str) -> Service {
        repo.create(&Service {
            id: 0,
            category_id: category.id,
            name: slug.to_string(),
            slug: slug.to_string(),
            path: compute_path(Some(category.path.as_str()), slug),
            summary: None,
            content: String::new(),
            content_html: String::new(),
            published: true,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_derives_slug_and_path() {
        let (svc, _, _) = setup().await;
        let root = svc.create(input("IT-tjänster", None)).await.unwrap();
        assert_eq!(root.slug, "it-tjanster");
        assert_eq!(root.path, "/it-tjanster");

        let child = svc.create(input("Drift & Support", Some(root.id))).await.unwrap();
        assert_eq!(child.path, "/it-tjanster/drift-support");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_input() {
        let (svc, _, _) = setup().await;
        svc.create(input("Ekonomi", None)).await.unwrap();

        assert!(matches!(
            svc.create(input("Ekonomi", None)).await,
            Err(CategoryServiceError::DuplicateSlug(_))
        ));
        assert!(matches!(
            svc.create(input("  ", None)).await,
            Err(CategoryServiceError::ValidationError { field: "name", .. })
        ));
        assert!(matches!(
            svc.create(CreateCategoryInput { slug: Some("Ogiltig Slug".into()), ..input("X", None) }).await,
            Err(CategoryServiceError::ValidationError { field: "slug", .. })
        ));
        assert!(matches!(
            svc.create(input("Y", Some(999))).await,
            Err(CategoryServiceError::ParentNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_rename_cascades_to_descendants_and_services() {
        let (svc, services, _) = setup().await;
        let it = svc.create(input("IT", None)).await.unwrap();
        let drift = svc.create(input("Drift", Some(it.id))).await.unwrap();
        let natverk = svc.create(input("Nätverk", Some(drift.id))).await.unwrap();
        let s = add_service(&services, &natverk, "brandvagg").await;

        let updated = svc
            .update(it.id, UpdateCategoryInput { slug: Some("teknik".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.path, "/teknik");

        assert_eq!(svc.get_by_id(drift.id).await.unwrap().path, "/teknik/drift");
        assert_eq!(svc.get_by_id(natverk.id).await.unwrap().path, "/teknik/drift/natverk");
        assert_eq!(services.get_by_id(s.id).await.unwrap().unwrap().path, "/teknik/drift/natverk/brandvagg");
    }

    #[tokio::test]
    async fn test_reparent_moves_subtree() {
        let (svc, services, _) = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", None)).await.unwrap();
        let c = svc.create(input("C", Some(a.id))).await.unwrap();
        let s = add_service(&services, &c, "tjanst").await;

        svc.update(c.id, UpdateCategoryInput { parent_id: Some(Some(b.id)), ..Default::default() })
            .await
            .unwrap();

        let moved = svc.get_by_id(c.id).await.unwrap();
        assert_eq!(moved.parent_id, Some(b.id));
        assert_eq!(moved.path, "/b/c");
        assert_eq!(services.get_by_id(s.id).await.unwrap().unwrap().path, "/b/c/tjanst");

        svc.update(c.id, UpdateCategoryInput { parent_id: Some(None), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(svc.get_by_id(c.id).await.unwrap().path, "/c");
    }

    #[tokio::test]
    async fn test_cycle_rejected_without_writes() {
        let (svc, _, _) = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", Some(a.id))).await.unwrap();

        let result = svc
            .update(a.id, UpdateCategoryInput { parent_id: Some(Some(b.id)), name: Some("Nytt".into()), ..Default::default() })
            .await;
        assert!(matches!(result, Err(CategoryServiceError::CircularReference)));

        let unchanged = svc.get_by_id(a.id).await.unwrap();
        assert_eq!(unchanged.name, "A");
        assert_eq!(unchanged.parent_id, None);

        let self_parent = svc.update(a.id, UpdateCategoryInput { parent_id: Some(Some(a.id)), ..Default::default() }).await;
        assert!(matches!(self_parent, Err(CategoryServiceError::CircularReference)));
    }

    #[tokio::test]
    async fn test_rename_to_taken_slug_rejected() {
        let (svc, _, _) = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", Some(a.id))).await.unwrap();

        let result = svc.update(b.id, UpdateCategoryInput { slug: Some("a".into()), ..Default::default() }).await;
        assert!(matches!(result, Err(CategoryServiceError::DuplicateSlug(_))));
        assert_eq!(svc.get_by_id(b.id).await.unwrap().path, "/a/b");
    }

    #[tokio::test]
    async fn test_delete_reparents_children() {
        let (svc, services, _) = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        let b = svc.create(input("B", Some(a.id))).await.unwrap();
        let c = svc.create(input("C", Some(b.id))).await.unwrap();
        let s = add_service(&services, &c, "tjanst").await;

        svc.delete(b.id).await.unwrap();

        let c = svc.get_by_id(c.id).await.unwrap();
        assert_eq!(c.parent_id, Some(a.id));
        assert_eq!(c.path, "/a/c");
        assert_eq!(services.get_by_id(s.id).await.unwrap().unwrap().path, "/a/c/tjanst");
        assert!(matches!(svc.get_by_id(b.id).await, Err(CategoryServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_refused_with_services() {
        let (svc, services, _) = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        add_service(&services, &a, "tjanst").await;

        assert!(matches!(svc.delete(a.id).await, Err(CategoryServiceError::HasServices(1))));
    }

    #[tokio::test]
    async fn test_tree_cache_invalidated_on_write() {
        let (svc, _, _) = setup().await;
        let a = svc.create(input("A", None)).await.unwrap();
        assert_eq!(svc.list_tree().await.unwrap().len(), 1);

        svc.create(input("B", Some(a.id))).await.unwrap();
        let tree = svc.list_tree().await.unwrap();
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(svc.list().await.unwrap().len(), 2);
    }
}
