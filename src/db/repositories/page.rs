//! Page repository

use super::apply_path_changes;
use crate::db::DbPool;
use crate::models::{Page, PublishStatus};
use crate::services::hierarchy::{PathChange, TreeNode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const PAGE_COLUMNS: &str = "id, parent_id, title, slug, path, content, content_html, meta_description, \
    status, sort_order, created_at, updated_at";

#[async_trait]
pub trait PageRepository: Send + Sync {
    async fn create(&self, page: &Page) -> Result<Page>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>>;

    async fn get_by_path(&self, path: &str) -> Result<Option<Page>>;

    /// All pages ordered by path
    async fn list(&self) -> Result<Vec<Page>>;

    async fn list_published(&self) -> Result<Vec<Page>>;

    async fn tree_nodes(&self) -> Result<Vec<TreeNode>>;

    /// Update the page and move its descendants in one transaction
    async fn update_with_cascade(&self, page: &Page, changes: &[PathChange]) -> Result<Page>;

    /// Lift the children of `id` to `new_parent_id` and delete the page
    async fn delete_and_reparent(&self, id: i64, new_parent_id: Option<i64>, changes: &[PathChange]) -> Result<()>;

    async fn exists_by_path(&self, path: &str) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxPageRepository {
    pool: DbPool,
}

impl SqlxPageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn create(&self, page: &Page) -> Result<Page> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO pages (parent_id, title, slug, path, content, content_html, meta_description,
                               status, sort_order, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(page.parent_id)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.path)
        .bind(&page.content)
        .bind(&page.content_html)
        .bind(&page.meta_description)
        .bind(page.status.to_string())
        .bind(page.sort_order)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create page")?;

        Ok(Page {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..page.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>> {
        let row = sqlx::query(&format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get page by ID")?;
        Ok(row.map(|r| row_to_page(&r)))
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<Page>> {
        let row = sqlx::query(&format!("SELECT {} FROM pages WHERE path = ?", PAGE_COLUMNS))
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get page by path")?;
        Ok(row.map(|r| row_to_page(&r)))
    }

    async fn list(&self) -> Result<Vec<Page>> {
        let rows = sqlx::query(&format!("SELECT {} FROM pages ORDER BY path", PAGE_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pages")?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn list_published(&self) -> Result<Vec<Page>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pages WHERE status = 'published' ORDER BY sort_order, title",
            PAGE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list published pages")?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn tree_nodes(&self) -> Result<Vec<TreeNode>> {
        let rows = sqlx::query("SELECT id, parent_id, slug, path FROM pages")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load page hierarchy")?;
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

    async fn update_with_cascade(&self, page: &Page, changes: &[PathChange]) -> Result<Page> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        apply_path_changes(&mut tx, "pages", changes).await?;

        sqlx::query(
            r#"
            UPDATE pages
            SET parent_id = ?, title = ?, slug = ?, path = ?, content = ?, content_html = ?,
                meta_description = ?, status = ?, sort_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(page.parent_id)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.path)
        .bind(&page.content)
        .bind(&page.content_html)
        .bind(&page.meta_description)
        .bind(page.status.to_string())
        .bind(page.sort_order)
        .bind(now)
        .bind(page.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update page")?;

        tx.commit().await.context("Failed to commit page update")?;

        Ok(Page {
            updated_at: now,
            ..page.clone()
        })
    }

    async fn delete_and_reparent(&self, id: i64, new_parent_id: Option<i64>, changes: &[PathChange]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE pages SET parent_id = ?, updated_at = ? WHERE parent_id = ?")
            .bind(new_parent_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to re-parent child pages")?;

        apply_path_changes(&mut tx, "pages", changes).await?;

        sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete page")?;

        tx.commit().await.context("Failed to commit page delete")?;
        Ok(())
    }

    async fn exists_by_path(&self, path: &str) -> Result<bool> {
        Ok(self.get_by_path(path).await?.is_some())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM pages")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pages")?;
        Ok(row.get("count"))
    }
}

fn row_to_page(row: &sqlx::sqlite::SqliteRow) -> Page {
    let status: String = row.get("status");
    Page {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        path: row.get("path"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        meta_description: row.get("meta_description"),
        status: status.parse().unwrap_or(PublishStatus::Draft),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxPageRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxPageRepository::new(pool)
    }

    fn page(parent_id: Option<i64>, slug: &str, path: &str, status: PublishStatus) -> Page {
        Page {
            id: 0,
            parent_id,
            title: slug.to_string(),
            slug: slug.to_string(),
            path: path.to_string(),
            content: String::new(),
            content_html: String::new(),
            meta_description: None,
            status,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_same_slug_under_different_parents() {
        let repo = setup_test_repo().await;
        let a = repo.create(&page(None, "om-oss", "/om-oss", PublishStatus::Published)).await.unwrap();
        let b = repo.create(&page(None, "karriar", "/karriar", PublishStatus::Draft)).await.unwrap();
        repo.create(&page(Some(a.id), "kontakt", "/om-oss/kontakt", PublishStatus::Published)).await.unwrap();
        repo.create(&page(Some(b.id), "kontakt", "/karriar/kontakt", PublishStatus::Published)).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 4);
        assert_eq!(repo.list_published().await.unwrap().len(), 3);
        let fetched = repo.get_by_path("/karriar/kontakt").await.unwrap().unwrap();
        assert_eq!(fetched.parent_id, Some(b.id));
        assert_eq!(fetched.status, PublishStatus::Published);
    }

    #[tokio::test]
    async fn test_update_with_cascade_moves_children() {
        let repo = setup_test_repo().await;
        let a = repo.create(&page(None, "om-oss", "/om-oss", PublishStatus::Draft)).await.unwrap();
        let child = repo.create(&page(Some(a.id), "team", "/om-oss/team", PublishStatus::Draft)).await.unwrap();

        let renamed = Page { slug: "foretaget".into(), path: "/foretaget".into(), ..a.clone() };
        let changes = vec![PathChange { id: child.id, old_path: "/om-oss/team".into(), new_path: "/foretaget/team".into() }];
        repo.update_with_cascade(&renamed, &changes).await.unwrap();

        assert!(repo.exists_by_path("/foretaget/team").await.unwrap());
        assert!(!repo.exists_by_path("/om-oss").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_reparent() {
        let repo = setup_test_repo().await;
        let a = repo.create(&page(None, "a", "/a", PublishStatus::Draft)).await.unwrap();
        let b = repo.create(&page(Some(a.id), "b", "/a/b", PublishStatus::Draft)).await.unwrap();

        let changes = vec![PathChange { id: b.id, old_path: "/a/b".into(), new_path: "/b".into() }];
        repo.delete_and_reparent(a.id, None, &changes).await.unwrap();

        let moved = repo.get_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(moved.parent_id, None);
        assert_eq!(moved.path, "/b");
        assert_eq!(repo.tree_nodes().await.unwrap().len(), 1);
    }
}
