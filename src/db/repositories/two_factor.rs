//! Two-factor state repository
//!
//! TOTP secrets and the grace deadline live on the `users` row; backup codes
//! are stored as SHA-256 hashes in `backup_codes`.

use crate::db::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait TwoFactorRepository: Send + Sync {
    /// Store (or clear) the secret of an unfinished setup
    async fn set_pending_secret(&self, user_id: i64, secret: Option<&str>) -> Result<()>;

    /// Promote a secret to active, replace backup codes and drop the grace deadline
    async fn enable(&self, user_id: i64, secret: &str, code_hashes: &[String]) -> Result<()>;

    /// Turn 2FA off, delete backup codes and start a new grace period
    async fn disable(&self, user_id: i64, grace_expires_at: DateTime<Utc>) -> Result<()>;

    /// Set the grace deadline only if none is stored yet. Returns whether it was set.
    async fn initialize_grace(&self, user_id: i64, expires_at: DateTime<Utc>) -> Result<bool>;

    async fn replace_backup_codes(&self, user_id: i64, code_hashes: &[String]) -> Result<()>;

    /// Mark a matching unused code as used. Returns whether one was found.
    async fn consume_backup_code(&self, user_id: i64, code_hash: &str) -> Result<bool>;

    async fn count_unused_backup_codes(&self, user_id: i64) -> Result<i64>;
}

pub struct SqlxTwoFactorRepository {
    pool: DbPool,
}

impl SqlxTwoFactorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn TwoFactorRepository> {
        Arc::new(Self::new(pool))
    }
}

async fn insert_codes(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    code_hashes: &[String],
) -> Result<()> {
    let now = Utc::now();
    sqlx::query("DELETE FROM backup_codes WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("Failed to delete backup codes")?;

    for hash in code_hashes {
        sqlx::query("INSERT INTO backup_codes (user_id, code_hash, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(hash)
            .bind(now)
            .execute(&mut **tx)
            .await
            .context("Failed to insert backup code")?;
    }
    Ok(())
}

#[async_trait]
impl TwoFactorRepository for SqlxTwoFactorRepository {
    async fn set_pending_secret(&self, user_id: i64, secret: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET two_factor_pending_secret = ?, updated_at = ? WHERE id = ?")
            .bind(secret)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to store pending 2FA secret")?;
        Ok(())
    }

    async fn enable(&self, user_id: i64, secret: &str, code_hashes: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = 1, two_factor_secret = ?, two_factor_pending_secret = NULL,
                two_factor_grace_expires_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(secret)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to enable 2FA")?;

        insert_codes(&mut tx, user_id, code_hashes).await?;

        tx.commit().await.context("Failed to commit 2FA enable")?;
        Ok(())
    }

    async fn disable(&self, user_id: i64, grace_expires_at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = 0, two_factor_secret = NULL, two_factor_pending_secret = NULL,
                two_factor_grace_expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(grace_expires_at)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to disable 2FA")?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete backup codes")?;

        tx.commit().await.context("Failed to commit 2FA disable")?;
        Ok(())
    }

    async fn initialize_grace(&self, user_id: i64, expires_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET two_factor_grace_expires_at = ?
            WHERE id = ? AND two_factor_grace_expires_at IS NULL AND two_factor_enabled = 0
            "#,
        )
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to initialize 2FA grace period")?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_backup_codes(&self, user_id: i64, code_hashes: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_codes(&mut tx, user_id, code_hashes).await?;
        tx.commit().await.context("Failed to commit backup codes")?;
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: i64, code_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE backup_codes SET used_at = ?
            WHERE id = (
                SELECT id FROM backup_codes
                WHERE user_id = ? AND code_hash = ? AND used_at IS NULL
                LIMIT 1
            )
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(code_hash)
        .execute(&self.pool)
        .await
        .context("Failed to consume backup code")?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_unused_backup_codes(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM backup_codes WHERE user_id = ? AND used_at IS NULL")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count backup codes")?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn setup() -> (SqlxUserRepository, SqlxTwoFactorRepository, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new("a@example.se".into(), "h".into(), "A".into(), UserRole::Editor))
            .await
            .unwrap();
        (users, SqlxTwoFactorRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_initialize_grace_only_once() {
        let (users, repo, id) = setup().await;
        let first = Utc::now() + Duration::days(30);

        assert!(repo.initialize_grace(id, first).await.unwrap());
        assert!(!repo.initialize_grace(id, first + Duration::days(5)).await.unwrap());

        let user = users.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.two_factor_grace_expires_at.map(|t| t.timestamp()), Some(first.timestamp()));
    }

    #[tokio::test]
    async fn test_enable_and_consume_codes() {
        let (users, repo, id) = setup().await;
        repo.set_pending_secret(id, Some("PENDING")).await.unwrap();

        let hashes = vec!["h1".to_string(), "h2".to_string()];
        repo.enable(id, "SECRET", &hashes).await.unwrap();

        let user = users.get_by_id(id).await.unwrap().unwrap();
        assert!(user.two_factor_enabled);
        assert_eq!(user.two_factor_secret.as_deref(), Some("SECRET"));
        assert!(user.two_factor_pending_secret.is_none());
        assert_eq!(repo.count_unused_backup_codes(id).await.unwrap(), 2);

        assert!(repo.consume_backup_code(id, "h1").await.unwrap());
        assert!(!repo.consume_backup_code(id, "h1").await.unwrap());
        assert_eq!(repo.count_unused_backup_codes(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disable_restarts_grace() {
        let (users, repo, id) = setup().await;
        repo.enable(id, "SECRET", &["h1".to_string()]).await.unwrap();

        let grace = Utc::now() + Duration::days(30);
        repo.disable(id, grace).await.unwrap();

        let user = users.get_by_id(id).await.unwrap().unwrap();
        assert!(!user.two_factor_enabled);
        assert!(user.two_factor_secret.is_none());
        assert!(user.two_factor_grace_expires_at.is_some());
        assert_eq!(repo.count_unused_backup_codes(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_backup_codes() {
        let (_users, repo, id) = setup().await;
        repo.replace_backup_codes(id, &["a".into(), "b".into()]).await.unwrap();
        repo.replace_backup_codes(id, &["c".into()]).await.unwrap();

        assert_eq!(repo.count_unused_backup_codes(id).await.unwrap(), 1);
        assert!(!repo.consume_backup_code(id, "a").await.unwrap());
        assert!(repo.consume_backup_code(id, "c").await.unwrap());
    }
}
