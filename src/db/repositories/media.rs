//! Media library repository

use crate::db::DbPool;
use crate::models::{Media, MediaVariant, VariantKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const MEDIA_COLUMNS: &str =
    "id, storage_key, filename, content_type, size_bytes, width, height, alt_text, uploaded_by, created_at";

/// Variant row to insert alongside a new media record
#[derive(Debug, Clone)]
pub struct NewMediaVariant {
    pub kind: VariantKind,
    pub storage_key: String,
    pub width: i32,
    pub height: i32,
    pub size_bytes: i64,
}

#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Insert a media row and its variants in one transaction
    async fn create_with_variants(
        &self,
        media: &Media,
        variants: &[NewMediaVariant],
    ) -> Result<(Media, Vec<MediaVariant>)>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>>;

    /// Whether any media row already stores objects under `dir/`
    async fn dir_in_use(&self, dir: &str) -> Result<bool>;

    async fn variants_for(&self, media_id: i64) -> Result<Vec<MediaVariant>>;

    /// Newest first
    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<Media>, i64)>;

    async fn update_alt(&self, id: i64, alt_text: Option<&str>) -> Result<bool>;

    /// Delete the row (variants cascade) and return every storage key it owned
    async fn delete(&self, id: i64) -> Result<Option<Vec<String>>>;
}

pub struct SqlxMediaRepository {
    pool: DbPool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create_with_variants(
        &self,
        media: &Media,
        variants: &[NewMediaVariant],
    ) -> Result<(Media, Vec<MediaVariant>)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO media (storage_key, filename, content_type, size_bytes, width, height, alt_text, uploaded_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&media.storage_key)
        .bind(&media.filename)
        .bind(&media.content_type)
        .bind(media.size_bytes)
        .bind(media.width)
        .bind(media.height)
        .bind(&media.alt_text)
        .bind(media.uploaded_by)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create media")?;
        let media_id = result.last_insert_rowid();

        let mut stored = Vec::with_capacity(variants.len());
        for v in variants {
            let result = sqlx::query(
                r#"
                INSERT INTO media_variants (media_id, kind, storage_key, width, height, size_bytes)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(media_id)
            .bind(v.kind.as_str())
            .bind(&v.storage_key)
            .bind(v.width)
            .bind(v.height)
            .bind(v.size_bytes)
            .execute(&mut *tx)
            .await
            .context("Failed to create media variant")?;

            stored.push(MediaVariant {
                id: result.last_insert_rowid(),
                media_id,
                kind: v.kind,
                storage_key: v.storage_key.clone(),
                width: v.width,
                height: v.height,
                size_bytes: v.size_bytes,
            });
        }

        tx.commit().await.context("Failed to commit media")?;

        Ok((
            Media {
                id: media_id,
                created_at: now,
                ..media.clone()
            },
            stored,
        ))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>> {
        let row = sqlx::query(&format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get media by ID")?;
        Ok(row.map(|r| row_to_media(&r)))
    }

    async fn dir_in_use(&self, dir: &str) -> Result<bool> {
        let prefix = format!("{}/", dir);
        let (in_use,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM media WHERE substr(storage_key, 1, length(?1)) = ?1)",
        )
        .bind(&prefix)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check media directory")?;
        Ok(in_use)
    }

    async fn variants_for(&self, media_id: i64) -> Result<Vec<MediaVariant>> {
        let rows = sqlx::query(
            "SELECT id, media_id, kind, storage_key, width, height, size_bytes FROM media_variants WHERE media_id = ? ORDER BY width",
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list media variants")?;

        let mut variants = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.get("kind");
            variants.push(MediaVariant {
                id: row.get("id"),
                media_id: row.get("media_id"),
                kind: kind.parse()?,
                storage_key: row.get("storage_key"),
                width: row.get("width"),
                height: row.get("height"),
                size_bytes: row.get("size_bytes"),
            });
        }
        Ok(variants)
    }

    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<Media>, i64)> {
        let offset = (page.max(1) - 1) * per_page;
        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM media")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count media")?
            .get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM media ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MEDIA_COLUMNS
        ))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list media")?;

        Ok((rows.iter().map(row_to_media).collect(), total))
    }

    async fn update_alt(&self, id: i64, alt_text: Option<&str>) -> Result<bool> {
        let result = sqlx::query("UPDATE media SET alt_text = ? WHERE id = ?")
            .bind(alt_text)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update media alt text")?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: i64) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let original = sqlx::query("SELECT storage_key FROM media WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to get media storage key")?;
        let Some(original) = original else {
            return Ok(None);
        };

        let mut keys: Vec<String> = vec![original.get("storage_key")];
        let variant_rows = sqlx::query("SELECT storage_key FROM media_variants WHERE media_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to get variant storage keys")?;
        keys.extend(variant_rows.iter().map(|r| r.get::<String, _>("storage_key")));

        sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete media")?;

        tx.commit().await.context("Failed to commit media delete")?;
        Ok(Some(keys))
    }
}

fn row_to_media(row: &sqlx::sqlite::SqliteRow) -> Media {
    Media {
        id: row.get("id"),
        storage_key: row.get("storage_key"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        width: row.get("width"),
        height: row.get("height"),
        alt_text: row.get("alt_text"),
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    fn media(key: &str) -> Media {
        Media {
            id: 0,
            storage_key: key.into(),
            filename: "bild.png".into(),
            content_type: "image/png".into(),
            size_bytes: 1234,
            width: Some(800),
            height: Some(600),
            alt_text: None,
            uploaded_by: None,
            created_at: Utc::now(),
        }
    }

    fn new_variant(kind: VariantKind, width: i32) -> NewMediaVariant {
        NewMediaVariant {
            kind,
            storage_key: format!("media/x/{}.webp", kind),
            width,
            height: width * 3 / 4,
            size_bytes: 100,
        }
    }

    #[tokio::test]
    async fn test_create_list_and_delete_returns_keys() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxMediaRepository::new(pool);

        let (created, variants) = repo
            .create_with_variants(
                &media("media/x/original.png"),
                &[new_variant(VariantKind::Thumb, 150), new_variant(VariantKind::Small, 480)],
            )
            .await
            .unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].media_id, created.id);
        assert!(repo.dir_in_use("media/x").await.unwrap());
        assert!(!repo.dir_in_use("media/xy").await.unwrap());

        let fetched = repo.variants_for(created.id).await.unwrap();
        assert_eq!(fetched[0].kind, VariantKind::Thumb);

        assert!(repo.update_alt(created.id, Some("Logotyp")).await.unwrap());
        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().alt_text.as_deref(), Some("Logotyp"));

        let (listed, total) = repo.list(1, 10).await.unwrap();
        assert_eq!((listed.len(), total), (1, 1));

        let keys = repo.delete(created.id).await.unwrap().unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"media/x/original.png".to_string()));
        assert!(repo.variants_for(created.id).await.unwrap().is_empty());
        assert!(repo.delete(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_variant_kind_rolls_back() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxMediaRepository::new(pool);

        let result = repo
            .create_with_variants(
                &media("media/y/original.png"),
                &[new_variant(VariantKind::Thumb, 150), new_variant(VariantKind::Thumb, 150)],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(repo.list(1, 10).await.unwrap().1, 0);
    }
}
