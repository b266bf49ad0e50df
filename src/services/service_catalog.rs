//! Service catalogue
//!
//! Offerings listed under a category. A service's path is always its
//! category's path plus its own slug; category moves keep it in sync.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{CategoryRepository, ServiceRepository};
use crate::models::{Category, CreateServiceInput, Service, UpdateServiceInput};
use crate::services::hierarchy::{compute_path, slugify, validate_slug};
use crate::services::MarkdownRenderer;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const CACHE_KEY_SERVICE_PUBLISHED: &str = "service:published";

#[derive(Debug, thiserror::Error)]
pub enum ServiceCatalogError {
    #[error("Tjänsten hittades inte: {0}")]
    NotFound(i64),

    #[error("Kategorin hittades inte: {0}")]
    CategoryNotFound(i64),

    #[error("Sluggen \"{0}\" används redan")]
    DuplicateSlug(String),

    #[error("Sökvägen \"{0}\" används redan")]
    DuplicatePath(String),

    #[error("{field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ServiceCatalog {
    repo: Arc<dyn ServiceRepository>,
    categories: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    markdown: MarkdownRenderer,
}

impl ServiceCatalog {
    pub fn new(repo: Arc<dyn ServiceRepository>, categories: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            categories,
            cache,
            markdown: MarkdownRenderer::new(),
        }
    }

    pub async fn create(&self, input: CreateServiceInput) -> Result<Service, ServiceCatalogError> {
        let name = validate_name(&input.name)?;
        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => slug.to_string(),
            None => slugify(&name),
        };
        validate_slug(&slug).map_err(|message| ServiceCatalogError::ValidationError { field: "slug", message })?;

        let category = self.category(input.category_id).await?;
        let path = compute_path(Some(category.path.as_str()), &slug);
        self.ensure_unique(None, &slug, &path).await?;

        let now = Utc::now();
        let service = Service {
            id: 0,
            category_id: category.id,
            name,
            slug: slug.clone(),
            path,
            summary: input.summary.filter(|s| !s.trim().is_empty()),
            content_html: self.markdown.render(&input.content),
            content: input.content,
            published: input.published,
            sort_order: input.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&service).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceCatalogError::DuplicateSlug(slug)
            } else {
                e.into()
            }
        })?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Service, ServiceCatalogError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get service")?
            .ok_or(ServiceCatalogError::NotFound(id))
    }

    pub async fn get_published_by_path(&self, path: &str) -> Result<Option<Service>, ServiceCatalogError> {
        let service = self.repo.get_by_path(path).await.context("Failed to get service by path")?;
        Ok(service.filter(|s| s.published))
    }

    pub async fn list(&self, category_id: Option<i64>) -> Result<Vec<Service>, ServiceCatalogError> {
        Ok(self.repo.list(category_id, false).await.context("Failed to list services")?)
    }

    pub async fn list_published(&self, category_id: Option<i64>) -> Result<Vec<Service>, ServiceCatalogError> {
        if category_id.is_none() {
            if let Some(list) = self.cache.get::<Vec<Service>>(CACHE_KEY_SERVICE_PUBLISHED).await.ok().flatten() {
                return Ok(list);
            }
        }

        let list = self.repo.list(category_id, true).await.context("Failed to list services")?;
        if category_id.is_none() {
            let _ = self.cache.set(CACHE_KEY_SERVICE_PUBLISHED, &list, self.cache.default_ttl()).await;
        }
        Ok(list)
    }

    pub async fn update(&self, id: i64, input: UpdateServiceInput) -> Result<Service, ServiceCatalogError> {
        let mut service = self.get_by_id(id).await?;

        if let Some(name) = input.name {
            service.name = validate_name(&name)?;
        }
        if let Some(slug) = input.slug {
            let slug = slug.trim().to_string();
            validate_slug(&slug).map_err(|message| ServiceCatalogError::ValidationError { field: "slug", message })?;
            service.slug = slug;
        }
        if let Some(category_id) = input.category_id {
            service.category_id = category_id;
        }

        let category = self.category(service.category_id).await?;
        service.path = compute_path(Some(category.path.as_str()), &service.slug);
        self.ensure_unique(Some(id), &service.slug, &service.path).await?;

        if let Some(summary) = input.summary {
            service.summary = Some(summary).filter(|s| !s.trim().is_empty());
        }
        if let Some(content) = input.content {
            service.content_html = self.markdown.render(&content);
            service.content = content;
        }
        if let Some(published) = input.published {
            service.published = published;
        }
        if let Some(sort_order) = input.sort_order {
            service.sort_order = sort_order;
        }

        let updated = self.repo.update(&service).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceCatalogError::DuplicatePath(service.path.clone())
            } else {
                e.into()
            }
        })?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceCatalogError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await.context("Failed to delete service")?;
        self.invalidate_cache().await;
        Ok(())
    }

    async fn category(&self, id: i64) -> Result<Category, ServiceCatalogError> {
        self.categories
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(ServiceCatalogError::CategoryNotFound(id))
    }

    async fn ensure_unique(&self, own_id: Option<i64>, slug: &str, path: &str) -> Result<(), ServiceCatalogError> {
        if let Some(other) = self.repo.get_by_slug(slug).await.context("Failed to check slug uniqueness")? {
            if Some(other.id) != own_id {
                return Err(ServiceCatalogError::DuplicateSlug(slug.to_string()));
            }
        }
        if let Some(other) = self.repo.get_by_path(path).await.context("Failed to check path uniqueness")? {
            if Some(other.id) != own_id {
                return Err(ServiceCatalogError::DuplicatePath(path.to_string()));
            }
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern("service:*").await;
    }
}

fn validate_name(name: &str) -> Result<String, ServiceCatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceCatalogError::ValidationError {
            field: "name",
            message: "Namn måste anges".to_string(),
        });
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxCategoryRepository, SqlxServiceRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::CategoryService;

    async fn setup() -> (ServiceCatalog, CategoryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let cache = Arc::new(MemoryCache::new());
        let services = SqlxServiceRepository::boxed(pool.clone());
        let categories = SqlxCategoryRepository::boxed(pool);
        (
            ServiceCatalog::new(services.clone(), categories.clone(), cache.clone()),
            CategoryService::new(categories, services, cache),
        )
    }

    fn category_input(name: &str) -> crate::models::CreateCategoryInput {
        crate::models::CreateCategoryInput {
            name: name.into(),
            slug: None,
            description: None,
            parent_id: None,
            sort_order: None,
        }
    }

    fn input(category_id: i64, name: &str, published: bool) -> CreateServiceInput {
        CreateServiceInput {
            category_id,
            name: name.into(),
            slug: None,
            summary: None,
            content: "Vi tar hand om **allt**.".into(),
            published,
            sort_order: None,
        }
    }

    #[tokio::test]
    async fn test_create_derives_path_from_category() {
        let (catalog, categories) = setup().await;
        let it = categories.create(category_input("IT")).await.unwrap();

        let s = catalog.create(input(it.id, "Molndrift", true)).await.unwrap();
        assert_eq!(s.path, "/it/molndrift");
        assert!(s.content_html.contains("<strong>allt</strong>"));

        assert!(matches!(
            catalog.create(input(it.id, "Molndrift", true)).await,
            Err(ServiceCatalogError::DuplicateSlug(_))
        ));
        assert!(matches!(
            catalog.create(input(404, "Annat", true)).await,
            Err(ServiceCatalogError::CategoryNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_move_to_other_category_recomputes_path() {
        let (catalog, categories) = setup().await;
        let it = categories.create(category_input("IT")).await.unwrap();
        let eko = categories.create(category_input("Ekonomi")).await.unwrap();
        let s = catalog.create(input(it.id, "Support", true)).await.unwrap();

        let moved = catalog
            .update(s.id, UpdateServiceInput { category_id: Some(eko.id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(moved.path, "/ekonomi/support");
        assert!(catalog.get_published_by_path("/it/support").await.unwrap().is_none());
        assert!(catalog.get_published_by_path("/ekonomi/support").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_published_listing_cache_follows_writes() {
        let (catalog, categories) = setup().await;
        let it = categories.create(category_input("IT")).await.unwrap();
        catalog.create(input(it.id, "Drift", true)).await.unwrap();
        let hidden = catalog.create(input(it.id, "Intern", false)).await.unwrap();

        assert_eq!(catalog.list_published(None).await.unwrap().len(), 1);

        catalog
            .update(hidden.id, UpdateServiceInput { published: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(catalog.list_published(None).await.unwrap().len(), 2);
        assert_eq!(catalog.list(Some(it.id)).await.unwrap().len(), 2);

        catalog.delete(hidden.id).await.unwrap();
        assert_eq!(catalog.list_published(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_category_rename_visible_through_catalog() {
        let (catalog, categories) = setup().await;
        let it = categories.create(category_input("IT")).await.unwrap();
        let s = catalog.create(input(it.id, "Drift", true)).await.unwrap();
        assert_eq!(catalog.list_published(None).await.unwrap()[0].path, "/it/drift");

        categories
            .update(it.id, crate::models::UpdateCategoryInput { slug: Some("teknik".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(catalog.get_by_id(s.id).await.unwrap().path, "/teknik/drift");
        assert_eq!(catalog.list_published(None).await.unwrap()[0].path, "/teknik/drift");
    }
}
