//! Form submission repository

use crate::db::DbPool;
use crate::models::{FormSubmission, SubmissionStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const SUBMISSION_COLUMNS: &str = "id, form_name, name, email, phone, company, message, campaign_variant_id, \
    status, remote_ip, created_at, updated_at";

#[async_trait]
pub trait FormSubmissionRepository: Send + Sync {
    /// Insert the submission and, when it references a campaign variant,
    /// bump that variant's conversion counter in the same transaction
    async fn create_with_conversion(&self, submission: &FormSubmission) -> Result<FormSubmission>;

    async fn get_by_id(&self, id: i64) -> Result<Option<FormSubmission>>;

    /// Newest first, paginated, optionally filtered by status
    async fn list(
        &self,
        status: Option<SubmissionStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<FormSubmission>, i64)>;

    async fn update_status(&self, id: i64, status: SubmissionStatus) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count_by_status(&self, status: SubmissionStatus) -> Result<i64>;
}

pub struct SqlxFormSubmissionRepository {
    pool: DbPool,
}

impl SqlxFormSubmissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn FormSubmissionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FormSubmissionRepository for SqlxFormSubmissionRepository {
    async fn create_with_conversion(&self, submission: &FormSubmission) -> Result<FormSubmission> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO form_submissions (form_name, name, email, phone, company, message,
                                          campaign_variant_id, status, remote_ip, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&submission.form_name)
        .bind(&submission.name)
        .bind(&submission.email)
        .bind(&submission.phone)
        .bind(&submission.company)
        .bind(&submission.message)
        .bind(submission.campaign_variant_id)
        .bind(submission.status.to_string())
        .bind(&submission.remote_ip)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create form submission")?;

        if let Some(variant_id) = submission.campaign_variant_id {
            sqlx::query("UPDATE campaign_variants SET conversions = conversions + 1 WHERE id = ?")
                .bind(variant_id)
                .execute(&mut *tx)
                .await
                .context("Failed to record variant conversion")?;
        }

        tx.commit().await.context("Failed to commit form submission")?;

        Ok(FormSubmission {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..submission.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<FormSubmission>> {
        let row = sqlx::query(&format!("SELECT {} FROM form_submissions WHERE id = ?", SUBMISSION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get form submission")?;
        Ok(row.map(|r| row_to_submission(&r)))
    }

    async fn list(
        &self,
        status: Option<SubmissionStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<FormSubmission>, i64)> {
        let status = status.map(|s| s.to_string());
        let offset = (page.max(1) - 1) * per_page;

        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM form_submissions WHERE (? IS NULL OR status = ?)")
            .bind(&status)
            .bind(&status)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count form submissions")?
            .get("count");

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM form_submissions
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            SUBMISSION_COLUMNS
        ))
        .bind(&status)
        .bind(&status)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list form submissions")?;

        Ok((rows.iter().map(row_to_submission).collect(), total))
    }

    async fn update_status(&self, id: i64, status: SubmissionStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE form_submissions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update form submission status")?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM form_submissions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete form submission")?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_by_status(&self, status: SubmissionStatus) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM form_submissions WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count form submissions")?;
        Ok(row.get("count"))
    }
}

fn row_to_submission(row: &sqlx::sqlite::SqliteRow) -> FormSubmission {
    let status: String = row.get("status");
    FormSubmission {
        id: row.get("id"),
        form_name: row.get("form_name"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        company: row.get("company"),
        message: row.get("message"),
        campaign_variant_id: row.get("campaign_variant_id"),
        status: status.parse().unwrap_or_default(),
        remote_ip: row.get("remote_ip"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::campaign::tests::{campaign, variant};
    use crate::db::repositories::{CampaignRepository, SqlxCampaignRepository};
    use crate::db::{create_test_pool, migrations};

    fn submission(variant_id: Option<i64>) -> FormSubmission {
        FormSubmission {
            id: 0,
            form_name: "kontakt".into(),
            name: "Erik".into(),
            email: "erik@example.se".into(),
            phone: None,
            company: None,
            message: "Hej".into(),
            campaign_variant_id: variant_id,
            status: SubmissionStatus::New,
            remote_ip: Some("127.0.0.1".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_conversion_counted_with_submission() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let campaigns = SqlxCampaignRepository::new(pool.clone());
        let repo = SqlxFormSubmissionRepository::new(pool);

        let c = campaigns.create(&campaign("host")).await.unwrap();
        let v = campaigns.create_variant(&variant(c.id, "A", 1)).await.unwrap();

        repo.create_with_conversion(&submission(Some(v.id))).await.unwrap();
        repo.create_with_conversion(&submission(None)).await.unwrap();

        assert_eq!(campaigns.get_variant(v.id).await.unwrap().unwrap().conversions, 1);
        assert_eq!(repo.count_by_status(SubmissionStatus::New).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_variant_rolls_back_submission() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxFormSubmissionRepository::new(pool);

        assert!(repo.create_with_conversion(&submission(Some(404))).await.is_err());
        let (items, total) = repo.list(None, 1, 20).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_status_filter_and_delete() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxFormSubmissionRepository::new(pool);

        let first = repo.create_with_conversion(&submission(None)).await.unwrap();
        repo.create_with_conversion(&submission(None)).await.unwrap();

        assert!(repo.update_status(first.id, SubmissionStatus::Archived).await.unwrap());
        let (archived, total) = repo.list(Some(SubmissionStatus::Archived), 1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(archived[0].id, first.id);

        assert!(repo.delete(first.id).await.unwrap());
        assert!(!repo.delete(first.id).await.unwrap());
        assert!(repo.get_by_id(first.id).await.unwrap().is_none());
    }
}
