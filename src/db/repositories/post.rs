//! Blog post repository

use crate::db::DbPool;
use crate::models::{Post, PublishStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const POST_COLUMNS: &str = "id, author_id, title, slug, excerpt, content, content_html, status, \
    published_at, created_at, updated_at";

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Newest first, paginated. Returns the page and the total count.
    async fn list(&self, page: i64, per_page: i64, published_only: bool) -> Result<(Vec<Post>, i64)>;

    async fn update(&self, post: &Post) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxPostRepository {
    pool: DbPool,
}

impl SqlxPostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO posts (author_id, title, slug, excerpt, content, content_html, status,
                               published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.author_id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(post.status.to_string())
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create post")?;

        Ok(Post {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by ID")?;
        Ok(row.map(|r| row_to_post(&r)))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by slug")?;
        Ok(row.map(|r| row_to_post(&r)))
    }

    async fn list(&self, page: i64, per_page: i64, published_only: bool) -> Result<(Vec<Post>, i64)> {
        let offset = (page.max(1) - 1) * per_page;

        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM posts WHERE (? = 0 OR status = 'published')")
            .bind(published_only)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count posts")?
            .get("count");

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts
            WHERE (? = 0 OR status = 'published')
            ORDER BY COALESCE(published_at, created_at) DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            POST_COLUMNS
        ))
        .bind(published_only)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list posts")?;

        Ok((rows.iter().map(row_to_post).collect(), total))
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, slug = ?, excerpt = ?, content = ?, content_html = ?, status = ?,
                published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(post.status.to_string())
        .bind(post.published_at)
        .bind(now)
        .bind(post.id)
        .execute(&self.pool)
        .await
        .context("Failed to update post")?;

        Ok(Post {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete post")?;
        Ok(())
    }
}

fn row_to_post(row: &sqlx::sqlite::SqliteRow) -> Post {
    let status: String = row.get("status");
    Post {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        status: status.parse().unwrap_or(PublishStatus::Draft),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
