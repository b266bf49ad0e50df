//! Service catalogue repository

use crate::db::DbPool;
use crate::models::Service;
use crate::services::hierarchy::TreeNode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const SERVICE_COLUMNS: &str = "id, category_id, name, slug, path, summary, content, content_html, \
    published, sort_order, created_at, updated_at";

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create(&self, service: &Service) -> Result<Service>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Service>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Service>>;

    async fn get_by_path(&self, path: &str) -> Result<Option<Service>>;

    /// All services, optionally restricted to one category or to published ones
    async fn list(&self, category_id: Option<i64>, published_only: bool) -> Result<Vec<Service>>;

    async fn update(&self, service: &Service) -> Result<Service>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count_by_category(&self, category_id: i64) -> Result<i64>;

    /// Snapshot with the owning category in `parent_id`
    async fn leaf_nodes(&self) -> Result<Vec<TreeNode>>;
}

pub struct SqlxServiceRepository {
    pool: DbPool,
}

impl SqlxServiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ServiceRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Service>> {
        let row = sqlx::query(&format!("SELECT {} FROM services WHERE {} = ?", SERVICE_COLUMNS, column))
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get service by {}", column))?;
        Ok(row.map(|r| row_to_service(&r)))
    }
}

#[async_trait]
impl ServiceRepository for SqlxServiceRepository {
    async fn create(&self, service: &Service) -> Result<Service> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO services (category_id, name, slug, path, summary, content, content_html,
                                  published, sort_order, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service.category_id)
        .bind(&service.name)
        .bind(&service.slug)
        .bind(&service.path)
        .bind(&service.summary)
        .bind(&service.content)
        .bind(&service.content_html)
        .bind(service.published)
        .bind(service.sort_order)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create service")?;

        Ok(Service {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..service.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Service>> {
        let row = sqlx::query(&format!("SELECT {} FROM services WHERE id = ?", SERVICE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get service by ID")?;
        Ok(row.map(|r| row_to_service(&r)))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Service>> {
        self.fetch_one_by("slug", slug).await
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<Service>> {
        self.fetch_one_by("path", path).await
    }

    async fn list(&self, category_id: Option<i64>, published_only: bool) -> Result<Vec<Service>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM services
            WHERE (? IS NULL OR category_id = ?) AND (? = 0 OR published = 1)
            ORDER BY sort_order, name
            "#,
            SERVICE_COLUMNS
        ))
        .bind(category_id)
        .bind(category_id)
        .bind(published_only)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list services")?;
        Ok(rows.iter().map(row_to_service).collect())
    }

    async fn update(&self, service: &Service) -> Result<Service> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE services
            SET category_id = ?, name = ?, slug = ?, path = ?, summary = ?, content = ?,
                content_html = ?, published = ?, sort_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(service.category_id)
        .bind(&service.name)
        .bind(&service.slug)
        .bind(&service.path)
        .bind(&service.summary)
        .bind(&service.content)
        .bind(&service.content_html)
        .bind(service.published)
        .bind(service.sort_order)
        .bind(now)
        .bind(service.id)
        .execute(&self.pool)
        .await
        .context("Failed to update service")?;

        Ok(Service {
            updated_at: now,
            ..service.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete service")?;
        Ok(())
    }

    async fn count_by_category(&self, category_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM services WHERE category_id = ?")
            .bind(category_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count services")?;
        Ok(row.get("count"))
    }

    async fn leaf_nodes(&self) -> Result<Vec<TreeNode>> {
        let rows = sqlx::query("SELECT id, category_id, slug, path FROM services")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load service paths")?;
        Ok(rows
            .iter()
            .map(|r| TreeNode {
                id: r.get("id"),
                parent_id: Some(r.get("category_id")),
                slug: r.get("slug"),
                path: r.get("path"),
            })
            .collect())
    }
}

fn row_to_service(row: &sqlx::sqlite::SqliteRow) -> Service {
    Service {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        path: row.get("path"),
        summary: row.get("summary"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        published: row.get("published"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{CategoryRepository, SqlxCategoryRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::Category;

    async fn setup() -> (SqlxServiceRepository, i64, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let categories = SqlxCategoryRepository::new(pool.clone());
        let mut ids = Vec::new();
        for slug in ["it", "ekonomi"] {
            let c = categories
                .create(&Category {
                    id: 0,
                    parent_id: None,
                    name: slug.into(),
                    slug: slug.into(),
                    path: format!("/{}", slug),
                    description: None,
                    sort_order: 0,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
            ids.push(c.id);
        }
        (SqlxServiceRepository::new(pool), ids[0], ids[1])
    }

    fn service(category_id: i64, slug: &str, path: &str, published: bool) -> Service {
        Service {
            id: 0,
            category_id,
            name: slug.to_uppercase(),
            slug: slug.into(),
            path: path.into(),
            summary: None,
            content: String::new(),
            content_html: String::new(),
            published,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (repo, it, eko) = setup().await;
        repo.create(&service(it, "drift", "/it/drift", true)).await.unwrap();
        repo.create(&service(it, "support", "/it/support", false)).await.unwrap();
        repo.create(&service(eko, "lon", "/ekonomi/lon", true)).await.unwrap();

        assert_eq!(repo.list(None, false).await.unwrap().len(), 3);
        assert_eq!(repo.list(Some(it), false).await.unwrap().len(), 2);
        assert_eq!(repo.list(Some(it), true).await.unwrap().len(), 1);
        assert_eq!(repo.list(None, true).await.unwrap().len(), 2);
        assert_eq!(repo.count_by_category(eko).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_update_delete() {
        let (repo, it, eko) = setup().await;
        let created = repo.create(&service(it, "drift", "/it/drift", true)).await.unwrap();
        assert_eq!(repo.get_by_path("/it/drift").await.unwrap().unwrap().id, created.id);

        let moved = Service { category_id: eko, path: "/ekonomi/drift".into(), ..created.clone() };
        repo.update(&moved).await.unwrap();
        assert!(repo.get_by_path("/it/drift").await.unwrap().is_none());
        assert_eq!(repo.get_by_slug("drift").await.unwrap().unwrap().category_id, eko);

        let leaves = repo.leaf_nodes().await.unwrap();
        assert_eq!(leaves[0].parent_id, Some(eko));

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_path_rejected() {
        let (repo, it, _) = setup().await;
        repo.create(&service(it, "drift", "/it/drift", true)).await.unwrap();
        let err = repo.create(&service(it, "drift2", "/it/drift", true)).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }
}
