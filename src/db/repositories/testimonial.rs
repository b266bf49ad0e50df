//! Testimonial repository

use crate::db::DbPool;
use crate::models::Testimonial;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const TESTIMONIAL_COLUMNS: &str =
    "id, author_name, company, quote, rating, published, sort_order, created_at, updated_at";

#[async_trait]
pub trait TestimonialRepository: Send + Sync {
    async fn create(&self, testimonial: &Testimonial) -> Result<Testimonial>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Testimonial>>;

    async fn list(&self, published_only: bool) -> Result<Vec<Testimonial>>;

    async fn update(&self, testimonial: &Testimonial) -> Result<Testimonial>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxTestimonialRepository {
    pool: DbPool,
}

impl SqlxTestimonialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn TestimonialRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TestimonialRepository for SqlxTestimonialRepository {
    async fn create(&self, testimonial: &Testimonial) -> Result<Testimonial> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO testimonials (author_name, company, quote, rating, published, sort_order, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&testimonial.author_name)
        .bind(&testimonial.company)
        .bind(&testimonial.quote)
        .bind(testimonial.rating)
        .bind(testimonial.published)
        .bind(testimonial.sort_order)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create testimonial")?;

        Ok(Testimonial {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..testimonial.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Testimonial>> {
        let row = sqlx::query(&format!("SELECT {} FROM testimonials WHERE id = ?", TESTIMONIAL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get testimonial by ID")?;
        Ok(row.map(|r| row_to_testimonial(&r)))
    }

    async fn list(&self, published_only: bool) -> Result<Vec<Testimonial>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM testimonials WHERE (? = 0 OR published = 1) ORDER BY sort_order, id",
            TESTIMONIAL_COLUMNS
        ))
        .bind(published_only)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list testimonials")?;
        Ok(rows.iter().map(row_to_testimonial).collect())
    }

    async fn update(&self, testimonial: &Testimonial) -> Result<Testimonial> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE testimonials
            SET author_name = ?, company = ?, quote = ?, rating = ?, published = ?, sort_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&testimonial.author_name)
        .bind(&testimonial.company)
        .bind(&testimonial.quote)
        .bind(testimonial.rating)
        .bind(testimonial.published)
        .bind(testimonial.sort_order)
        .bind(now)
        .bind(testimonial.id)
        .execute(&self.pool)
        .await
        .context("Failed to update testimonial")?;

        Ok(Testimonial {
            updated_at: now,
            ..testimonial.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM testimonials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete testimonial")?;
        Ok(())
    }
}

fn row_to_testimonial(row: &sqlx::sqlite::SqliteRow) -> Testimonial {
    Testimonial {
        id: row.get("id"),
        author_name: row.get("author_name"),
        company: row.get("company"),
        quote: row.get("quote"),
        rating: row.get("rating"),
        published: row.get("published"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    #[tokio::test]
    async fn test_published_filter_and_order() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxTestimonialRepository::new(pool);

        let base = Testimonial {
            id: 0,
            author_name: "Anna".into(),
            company: Some("AB".into()),
            quote: "Bra!".into(),
            rating: 5,
            published: true,
            sort_order: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.create(&base).await.unwrap();
        let first = repo.create(&Testimonial { sort_order: 1, ..base.clone() }).await.unwrap();
        let hidden = repo.create(&Testimonial { published: false, ..base.clone() }).await.unwrap();

        let listed = repo.list(true).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);

        repo.update(&Testimonial { published: true, ..hidden.clone() }).await.unwrap();
        assert_eq!(repo.list(true).await.unwrap().len(), 3);

        repo.delete(hidden.id).await.unwrap();
        assert_eq!(repo.list(false).await.unwrap().len(), 2);
    }
}
