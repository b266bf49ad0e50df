//! Campaign and A/B variant repository

use crate::db::DbPool;
use crate::models::{Campaign, CampaignVariant};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const CAMPAIGN_COLUMNS: &str =
    "id, name, slug, headline, description, active, starts_at, ends_at, created_at, updated_at";

const VARIANT_COLUMNS: &str =
    "id, campaign_id, name, headline, body, weight, views, conversions, created_at";

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, campaign: &Campaign) -> Result<Campaign>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Campaign>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Campaign>>;

    async fn list(&self) -> Result<Vec<Campaign>>;

    async fn update(&self, campaign: &Campaign) -> Result<Campaign>;

    /// Deletes the campaign and, through the foreign key, its variants
    async fn delete(&self, id: i64) -> Result<()>;

    async fn create_variant(&self, variant: &CampaignVariant) -> Result<CampaignVariant>;

    async fn get_variant(&self, id: i64) -> Result<Option<CampaignVariant>>;

    async fn list_variants(&self, campaign_id: i64) -> Result<Vec<CampaignVariant>>;

    async fn delete_variant(&self, id: i64) -> Result<()>;

    /// Increment the view counter. Returns false when the variant does not exist.
    async fn record_view(&self, variant_id: i64) -> Result<bool>;
}

pub struct SqlxCampaignRepository {
    pool: DbPool,
}

impl SqlxCampaignRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn CampaignRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CampaignRepository for SqlxCampaignRepository {
    async fn create(&self, campaign: &Campaign) -> Result<Campaign> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO campaigns (name, slug, headline, description, active, starts_at, ends_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.name)
        .bind(&campaign.slug)
        .bind(&campaign.headline)
        .bind(&campaign.description)
        .bind(campaign.active)
        .bind(campaign.starts_at)
        .bind(campaign.ends_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create campaign")?;

        Ok(Campaign {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..campaign.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Campaign>> {
        let row = sqlx::query(&format!("SELECT {} FROM campaigns WHERE id = ?", CAMPAIGN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get campaign by ID")?;
        Ok(row.map(|r| row_to_campaign(&r)))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query(&format!("SELECT {} FROM campaigns WHERE slug = ?", CAMPAIGN_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get campaign by slug")?;
        Ok(row.map(|r| row_to_campaign(&r)))
    }

    async fn list(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(&format!("SELECT {} FROM campaigns ORDER BY created_at DESC, id DESC", CAMPAIGN_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list campaigns")?;
        Ok(rows.iter().map(row_to_campaign).collect())
    }

    async fn update(&self, campaign: &Campaign) -> Result<Campaign> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE campaigns
            SET name = ?, slug = ?, headline = ?, description = ?, active = ?, starts_at = ?, ends_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&campaign.name)
        .bind(&campaign.slug)
        .bind(&campaign.headline)
        .bind(&campaign.description)
        .bind(campaign.active)
        .bind(campaign.starts_at)
        .bind(campaign.ends_at)
        .bind(now)
        .bind(campaign.id)
        .execute(&self.pool)
        .await
        .context("Failed to update campaign")?;

        Ok(Campaign {
            updated_at: now,
            ..campaign.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete campaign")?;
        Ok(())
    }

    async fn create_variant(&self, variant: &CampaignVariant) -> Result<CampaignVariant> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO campaign_variants (campaign_id, name, headline, body, weight, views, conversions, created_at)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(variant.campaign_id)
        .bind(&variant.name)
        .bind(&variant.headline)
        .bind(&variant.body)
        .bind(variant.weight)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create campaign variant")?;

        Ok(CampaignVariant {
            id: result.last_insert_rowid(),
            views: 0,
            conversions: 0,
            created_at: now,
            ..variant.clone()
        })
    }

    async fn get_variant(&self, id: i64) -> Result<Option<CampaignVariant>> {
        let row = sqlx::query(&format!("SELECT {} FROM campaign_variants WHERE id = ?", VARIANT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get campaign variant")?;
        Ok(row.map(|r| row_to_variant(&r)))
    }

    async fn list_variants(&self, campaign_id: i64) -> Result<Vec<CampaignVariant>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM campaign_variants WHERE campaign_id = ? ORDER BY id",
            VARIANT_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list campaign variants")?;
        Ok(rows.iter().map(row_to_variant).collect())
    }

    async fn delete_variant(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM campaign_variants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete campaign variant")?;
        Ok(())
    }

    async fn record_view(&self, variant_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE campaign_variants SET views = views + 1 WHERE id = ?")
            .bind(variant_id)
            .execute(&self.pool)
            .await
            .context("Failed to record variant view")?;
        Ok(result.rows_affected() == 1)
    }
}

fn row_to_campaign(row: &sqlx::sqlite::SqliteRow) -> Campaign {
    Campaign {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        headline: row.get("headline"),
        description: row.get("description"),
        active: row.get("active"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_variant(row: &sqlx::sqlite::SqliteRow) -> CampaignVariant {
    CampaignVariant {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        name: row.get("name"),
        headline: row.get("headline"),
        body: row.get("body"),
        weight: row.get("weight"),
        views: row.get("views"),
        conversions: row.get("conversions"),
        created_at: row.get("created_at"),
    }
}
