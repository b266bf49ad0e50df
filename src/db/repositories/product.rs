//! Product repository

use crate::db::DbPool;
use crate::models::Product;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const PRODUCT_COLUMNS: &str =
    "id, name, slug, description, price_ore, currency, stock, active, image_media_id, created_at, updated_at";

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, product: &Product) -> Result<Product>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>>;

    /// Products ordered by name; `active_only` hides inactive ones
    async fn list(&self, active_only: bool) -> Result<Vec<Product>>;

    async fn update(&self, product: &Product) -> Result<Product>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxProductRepository {
    pool: DbPool,
}

impl SqlxProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ProductRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn create(&self, product: &Product) -> Result<Product> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, slug, description, price_ore, currency, stock, active,
                                  image_media_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price_ore)
        .bind(&product.currency)
        .bind(product.stock)
        .bind(product.active)
        .bind(product.image_media_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create product")?;

        Ok(Product {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..product.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get product by ID")?;
        Ok(row.map(|r| row_to_product(&r)))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {} FROM products WHERE slug = ?", PRODUCT_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get product by slug")?;
        Ok(row.map(|r| row_to_product(&r)))
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM products WHERE (? = 0 OR active = 1) ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list products")?;
        Ok(rows.iter().map(row_to_product).collect())
    }

    async fn update(&self, product: &Product) -> Result<Product> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE products
            SET name = ?, slug = ?, description = ?, price_ore = ?, stock = ?, active = ?,
                image_media_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price_ore)
        .bind(product.stock)
        .bind(product.active)
        .bind(product.image_media_id)
        .bind(now)
        .bind(product.id)
        .execute(&self.pool)
        .await
        .context("Failed to update product")?;

        Ok(Product {
            updated_at: now,
            ..product.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete product")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM products")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count products")?;
        Ok(row.get("count"))
    }
}

pub(crate) fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        price_ore: row.get("price_ore"),
        currency: row.get("currency"),
        stock: row.get("stock"),
        active: row.get("active"),
        image_media_id: row.get("image_media_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
