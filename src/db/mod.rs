//! Database layer
//!
//! SQLite connection pool, embedded migrations and one repository per
//! aggregate. Repositories are traits with an `Sqlx*` implementation so
//! services can be handed `Arc<dyn ...>` and tested against in-memory
//! databases.
//!
//! # Usage
//!
//! ```ignore
//! use portalen::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping, DbPool};

/// True when a sqlx error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
    })
}
