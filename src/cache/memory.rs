//! In-memory cache implementation using moka
//!
//! Values are stored as JSON so any serde type can be cached. Every entry
//! carries its own TTL, enforced through a moka `Expiry` policy.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    /// JSON-serialized value
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Expire each entry after the TTL it was stored with
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Create a cache holding up to 10,000 entries with a one hour default TTL
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    /// TTL services use when they have no reason to pick another
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob-style match: `*` is any run of characters, `?` exactly one
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();

        // Iterative matcher with single-star backtracking
        let (mut pi, mut ki) = (0, 0);
        let mut star: Option<(usize, usize)> = None;

        while ki < key.len() {
            if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == key[ki]) {
                pi += 1;
                ki += 1;
            } else if pi < pattern.len() && pattern[pi] == '*' {
                star = Some((pi, ki));
                pi += 1;
            } else if let Some((star_pi, star_ki)) = star {
                pi = star_pi + 1;
                ki = star_ki + 1;
                star = Some((star_pi, star_ki + 1));
            } else {
                return false;
            }
        }

        pattern[pi..].iter().all(|&c| c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        // Full scan; the cache only holds a few thousand keys
        let keys_to_delete: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys_to_delete {
            self.cache.invalidate(&key).await;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();

        cache.set("key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = MemoryCache::new();
        let result: Option<String> = cache.get("nonexistent").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::new();

        cache.set("short", &1u32, Duration::from_millis(20)).await.unwrap();
        cache.set("long", &2u32, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<u32>("short").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        cache.set("category:tree", &"t".to_string(), ttl).await.unwrap();
        cache.set("category:id:1", &"c1".to_string(), ttl).await.unwrap();
        cache.set("page:tree", &"p".to_string(), ttl).await.unwrap();

        cache.delete_pattern("category:*").await.unwrap();

        assert_eq!(cache.get::<String>("category:tree").await.unwrap(), None);
        assert_eq!(cache.get::<String>("category:id:1").await.unwrap(), None);
        assert_eq!(cache.get::<String>("page:tree").await.unwrap(), Some("p".to_string()));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.set("b", &2, Duration::from_secs(60)).await.unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.get::<i32>("a").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_complex_types_and_overwrite() {
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Entry {
            id: i64,
            path: String,
        }

        let cache = MemoryCache::new();
        let first = Entry { id: 1, path: "/a".into() };
        let second = Entry { id: 1, path: "/b".into() };

        cache.set("entry", &first, Duration::from_secs(60)).await.unwrap();
        cache.set("entry", &second, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get::<Entry>("entry").await.unwrap(), Some(second));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("page:*", "page:tree"));
        assert!(MemoryCache::pattern_matches("page:*", "page:"));
        assert!(MemoryCache::pattern_matches("*:tree", "category:tree"));
        assert!(MemoryCache::pattern_matches("*", "anything"));
        assert!(!MemoryCache::pattern_matches("page:*", "post:1"));

        assert!(MemoryCache::pattern_matches("user:?:x", "user:1:x"));
        assert!(!MemoryCache::pattern_matches("user:?:x", "user:10:x"));

        assert!(MemoryCache::pattern_matches("a*b*c", "aXXbYYc"));
        assert!(!MemoryCache::pattern_matches("a*b*c", "aXXbYY"));
        assert!(MemoryCache::pattern_matches("exact", "exact"));
        assert!(!MemoryCache::pattern_matches("exact", "exactx"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// A trailing-star prefix pattern matches exactly the keys with that prefix
            #[test]
            fn prefix_pattern_matches_prefix(prefix in "[a-z:]{0,8}", key in "[a-z:]{0,12}") {
                let pattern = format!("{}*", prefix);
                prop_assert_eq!(MemoryCache::pattern_matches(&pattern, &key), key.starts_with(&prefix));
            }
        }
    }
}
