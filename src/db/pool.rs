//! Database connection pool
//!
//! Portalen runs on SQLite. File databases are created on first start,
//! `:memory:` gives a throwaway database for tests and development.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;

/// Shared connection pool handed to every repository
pub type DbPool = SqlitePool;

fn is_memory_url(url: &str) -> bool {
    url == ":memory:" || url.starts_with("sqlite::memory:")
}

/// Build the sqlx connection URL, creating the database directory if needed
fn prepare_connection_url(url: &str) -> Result<String> {
    if is_memory_url(url) {
        return Ok("sqlite::memory:".to_string());
    }

    let path = url.trim_start_matches("sqlite:");
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }
    }

    if url.starts_with("sqlite:") {
        if url.contains('?') {
            Ok(url.to_string())
        } else {
            Ok(format!("{}?mode=rwc", url))
        }
    } else {
        Ok(format!("sqlite:{}?mode=rwc", url))
    }
}

/// Create a database connection pool from configuration.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the connection
/// cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let connection_url = prepare_connection_url(&config.url)?;

    // Every in-memory connection is its own database, so keep exactly one.
    let max_connections = if is_memory_url(&config.url) {
        1
    } else {
        config.max_connections.max(1)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&connection_url)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", config.url))?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .context("Failed to enable foreign keys")?;

    Ok(pool)
}

/// Create an in-memory database pool for testing
pub async fn create_test_pool() -> Result<DbPool> {
    let config = DatabaseConfig {
        url: ":memory:".to_string(),
        ..DatabaseConfig::default()
    };
    create_pool(&config).await
}

/// Check that the database answers
pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}
