//! Category repository
//!
//! Besides plain CRUD this repository owns the transactional writes of the
//! path maintainer: a category update applies its own fields, every planned
//! category path change and every planned service path change atomically.

use super::apply_path_changes;
use crate::db::DbPool;
use crate::models::Category;
use crate::services::hierarchy::{PathChange, TreeNode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const CATEGORY_COLUMNS: &str =
    "id, parent_id, name, slug, path, description, sort_order, created_at, updated_at";

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn get_by_path(&self, path: &str) -> Result<Option<Category>>;

    /// All categories ordered by path
    async fn list(&self) -> Result<Vec<Category>>;

    /// Hierarchy snapshot for path planning
    async fn tree_nodes(&self) -> Result<Vec<TreeNode>>;

    /// Update a category's own fields and apply cascaded path changes in one transaction
    async fn update_with_cascade(
        &self,
        category: &Category,
        category_changes: &[PathChange],
        service_changes: &[PathChange],
    ) -> Result<Category>;

    /// Move the children of `id` to `new_parent_id`, apply the resulting path
    /// changes and delete the category, all in one transaction
    async fn delete_and_reparent(
        &self,
        id: i64,
        new_parent_id: Option<i64>,
        category_changes: &[PathChange],
        service_changes: &[PathChange],
    ) -> Result<()>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    async fn exists_by_path(&self, path: &str) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxCategoryRepository {
    pool: DbPool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM categories WHERE {} = ?",
            CATEGORY_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get category by {}", column))?;
        Ok(row.map(|r| row_to_category(&r)))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO categories (parent_id, name, slug, path, description, sort_order, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(category.parent_id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.path)
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create category")?;

        Ok(Category {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by ID")?;
        Ok(row.map(|r| row_to_category(&r)))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        self.fetch_one_by("slug", slug).await
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<Category>> {
        self.fetch_one_by("path", path).await
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM categories ORDER BY path",
            CATEGORY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories")?;
        Ok(rows.iter().map(row_to_category).collect())
    }

    async fn tree_nodes(&self) -> Result<Vec<TreeNode>> {
        let rows = sqlx::query("SELECT id, parent_id, slug, path FROM categories")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load category hierarchy")?;
        Ok(rows
            .iter()
            .map(|r| TreeNode {
                id: r.get("id"),
                parent_id: r.get("parent_id"),
                slug: r.get("slug"),
                path: r.get("path"),
            })
            .collect())
    }

    async fn update_with_cascade(
        &self,
        category: &Category,
        category_changes: &[PathChange],
        service_changes: &[PathChange],
    ) -> Result<Category> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        apply_path_changes(&mut tx, "categories", category_changes).await?;
        apply_path_changes(&mut tx, "services", service_changes).await?;

        sqlx::query(
            r#"
            UPDATE categories
            SET parent_id = ?, name = ?, slug = ?, path = ?, description = ?, sort_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(category.parent_id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.path)
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(now)
        .bind(category.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update category")?;

        tx.commit().await.context("Failed to commit category update")?;

        Ok(Category {
            updated_at: now,
            ..category.clone()
        })
    }

    async fn delete_and_reparent(
        &self,
        id: i64,
        new_parent_id: Option<i64>,
        category_changes: &[PathChange],
        service_changes: &[PathChange],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE categories SET parent_id = ?, updated_at = ? WHERE parent_id = ?")
            .bind(new_parent_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to re-parent child categories")?;

        apply_path_changes(&mut tx, "categories", category_changes).await?;
        apply_path_changes(&mut tx, "services", service_changes).await?;

        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete category")?;

        tx.commit().await.context("Failed to commit category delete")?;
        Ok(())
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }

    async fn exists_by_path(&self, path: &str) -> Result<bool> {
        Ok(self.get_by_path(path).await?.is_some())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM categories")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count categories")?;
        Ok(row.get("count"))
    }
}

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        path: row.get("path"),
        description: row.get("description"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DbPool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        (pool.clone(), SqlxCategoryRepository::new(pool))
    }

    fn category(parent_id: Option<i64>, slug: &str, path: &str) -> Category {
        Category {
            id: 0,
            parent_id,
            name: slug.to_string(),
            slug: slug.to_string(),
            path: path.to_string(),
            description: None,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup_test_repo().await;
        let root = repo.create(&category(None, "it", "/it")).await.unwrap();
        let child = repo.create(&category(Some(root.id), "drift", "/it/drift")).await.unwrap();

        assert_eq!(repo.get_by_slug("drift").await.unwrap().unwrap().id, child.id);
        assert_eq!(repo.get_by_path("/it/drift").await.unwrap().unwrap().id, child.id);
        assert!(repo.exists_by_path("/it").await.unwrap());
        assert!(!repo.exists_by_slug("saknas").await.unwrap());

        let nodes = repo.tree_nodes().await.unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_update_with_cascade_swaps_paths_atomically() {
        let (pool, repo) = setup_test_repo().await;
        let a = repo.create(&category(None, "a", "/a")).await.unwrap();
        let b = repo.create(&category(Some(a.id), "b", "/a/b")).await.unwrap();

        sqlx::query("INSERT INTO services (category_id, name, slug, path) VALUES (?, 'S', 's', '/a/b/s')")
            .bind(b.id)
            .execute(&pool)
            .await
            .unwrap();

        let renamed = Category { slug: "x".into(), path: "/x".into(), ..a.clone() };
        let category_changes = vec![
            PathChange { id: a.id, old_path: "/a".into(), new_path: "/x".into() },
            PathChange { id: b.id, old_path: "/a/b".into(), new_path: "/x/b".into() },
        ];
        let service_changes = vec![PathChange { id: 1, old_path: "/a/b/s".into(), new_path: "/x/b/s".into() }];

        repo.update_with_cascade(&renamed, &category_changes, &service_changes).await.unwrap();

        assert_eq!(repo.get_by_id(a.id).await.unwrap().unwrap().path, "/x");
        assert_eq!(repo.get_by_id(b.id).await.unwrap().unwrap().path, "/x/b");
        let row = sqlx::query("SELECT path FROM services WHERE id = 1").fetch_one(&pool).await.unwrap();
        assert_eq!(row.get::<String, _>("path"), "/x/b/s");
    }

    #[tokio::test]
    async fn test_failed_cascade_rolls_back() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create(&category(None, "a", "/a")).await.unwrap();
        let b = repo.create(&category(None, "b", "/b")).await.unwrap();

        // Slug collision makes the final UPDATE fail after paths were applied
        let clash = Category { slug: "b".into(), path: "/c".into(), ..a.clone() };
        let changes = vec![PathChange { id: a.id, old_path: "/a".into(), new_path: "/c".into() }];
        assert!(repo.update_with_cascade(&clash, &changes, &[]).await.is_err());

        assert_eq!(repo.get_by_id(a.id).await.unwrap().unwrap().path, "/a");
        assert_eq!(repo.get_by_id(b.id).await.unwrap().unwrap().path, "/b");
    }

    #[tokio::test]
    async fn test_delete_and_reparent() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create(&category(None, "a", "/a")).await.unwrap();
        let b = repo.create(&category(Some(a.id), "b", "/a/b")).await.unwrap();

        let changes = vec![PathChange { id: b.id, old_path: "/a/b".into(), new_path: "/b".into() }];
        repo.delete_and_reparent(a.id, None, &changes, &[]).await.unwrap();

        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
        let moved = repo.get_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(moved.parent_id, None);
        assert_eq!(moved.path, "/b");
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
