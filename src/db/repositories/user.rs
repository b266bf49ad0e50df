//! User repository

use crate::db::DbPool;
use crate::models::{User, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, email, password_hash, display_name, role, status, \
    two_factor_enabled, two_factor_secret, two_factor_pending_secret, \
    two_factor_grace_expires_at, last_login_at, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Lookup is case-insensitive
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist email, display name, password hash, role and status
    async fn update(&self, user: &User) -> Result<User>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Page through users, newest first, optionally filtered by role
    async fn list(&self, page: i64, per_page: i64, role: Option<UserRole>) -> Result<(Vec<User>, i64)>;

    async fn count(&self) -> Result<i64>;

    async fn count_by_role(&self, role: UserRole) -> Result<i64>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, display_name, role, status,
                               two_factor_enabled, two_factor_grace_expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role.to_string())
        .bind(user.status.to_string())
        .bind(user.two_factor_enabled)
        .bind(user.two_factor_grace_expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        Ok(User {
            id: result.last_insert_rowid(),
            email: user.email.to_lowercase(),
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by email")?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE users
            SET email = ?, password_hash = ?, display_name = ?, role = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role.to_string())
        .bind(user.status.to_string())
        .bind(now)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;

        Ok(User {
            email: user.email.to_lowercase(),
            updated_at: now,
            ..user.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    async fn list(&self, page: i64, per_page: i64, role: Option<UserRole>) -> Result<(Vec<User>, i64)> {
        let offset = (page.max(1) - 1) * per_page;
        let role = role.map(|r| r.to_string());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE (? IS NULL OR role = ?) ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(&role)
        .bind(&role)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM users WHERE (? IS NULL OR role = ?)")
            .bind(&role)
            .bind(&role)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?
            .get("count");

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        Ok((users, total))
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }

    async fn count_by_role(&self, role: UserRole) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE role = ?")
            .bind(role.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users by role")?;
        Ok(row.get("count"))
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to record login time")?;
        Ok(())
    }
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    let status_str: String = row.get("status");
    let status = UserStatus::from_str(&status_str).unwrap_or(UserStatus::Active);

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        role,
        status,
        two_factor_enabled: row.get("two_factor_enabled"),
        two_factor_secret: row.get("two_factor_secret"),
        two_factor_pending_secret: row.get("two_factor_pending_secret"),
        two_factor_grace_expires_at: row.get("two_factor_grace_expires_at"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn new_user(email: &str, role: UserRole) -> User {
        User::new(email.to_string(), "hash".to_string(), "Test".to_string(), role)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("Anna@Example.se", UserRole::Customer)).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.email, "anna@example.se");

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "anna@example.se");
        assert_eq!(fetched.role, UserRole::Customer);
        assert!(!fetched.two_factor_enabled);
        assert!(fetched.two_factor_grace_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_get_by_email_case_insensitive() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("erik@example.se", UserRole::Editor)).await.unwrap();

        assert!(repo.get_by_email("ERIK@example.se").await.unwrap().is_some());
        assert!(repo.get_by_email("nobody@example.se").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("dup@example.se", UserRole::Customer)).await.unwrap();
        let err = repo.create(&new_user("DUP@example.se", UserRole::Customer)).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_role_and_status() {
        let repo = setup_test_repo().await;
        let mut user = repo.create(&new_user("u@example.se", UserRole::Author)).await.unwrap();

        user.role = UserRole::Admin;
        user.status = UserStatus::Banned;
        repo.update(&user).await.unwrap();

        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.role, UserRole::Admin);
        assert!(fetched.is_banned());
    }

    #[tokio::test]
    async fn test_list_with_role_filter() {
        let repo = setup_test_repo().await;
        for i in 0..3 {
            repo.create(&new_user(&format!("c{}@example.se", i), UserRole::Customer)).await.unwrap();
        }
        repo.create(&new_user("e@example.se", UserRole::Editor)).await.unwrap();

        let (all, total) = repo.list(1, 10, None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(total, 4);

        let (customers, total) = repo.list(1, 2, Some(UserRole::Customer)).await.unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(total, 3);

        assert_eq!(repo.count_by_role(UserRole::Editor).await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("gone@example.se", UserRole::Customer)).await.unwrap();
        repo.delete(user.id).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_last_login() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("l@example.se", UserRole::Customer)).await.unwrap();
        let at = Utc::now();
        repo.touch_last_login(user.id, at).await.unwrap();

        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_login_at.map(|t| t.timestamp()), Some(at.timestamp()));
    }
}
