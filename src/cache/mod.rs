//! Cache layer
//!
//! In-process moka cache for read-heavy public data: the category tree, the
//! page tree and published content lists. Writers invalidate by key pattern.
//!
//! # Usage
//!
//! ```rust,ignore
//! use portalen::cache::{create_cache, CacheLayer};
//!
//! let cache = create_cache(&config.cache);
//! cache.set("category:tree", &tree, cache.default_ttl()).await?;
//! cache.delete_pattern("category:*").await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache operations
///
/// The generic methods keep this trait from being object safe, so services
/// hold the concrete [`Cache`] type.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// The cache implementation shared by all services
pub type Cache = MemoryCache;

/// Create the shared cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_uses_config_ttl() {
        let config = CacheConfig {
            ttl_seconds: 1800,
            ..CacheConfig::default()
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(1800));

        cache.set("key", &"value".to_string(), cache.default_ttl()).await.unwrap();
        let result: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(result, Some("value".to_string()));
    }
}
