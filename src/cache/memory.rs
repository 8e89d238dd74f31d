//! In-memory data cache using moka
//!
//! Values are stored as JSON so any serialisable type fits. Each entry
//! carries its own TTL through a moka `Expiry` policy.

use anyhow::{Context, Result};
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    json: Arc<String>,
    ttl: Duration,
}

/// Expires every entry after the TTL it was inserted with.
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
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

/// Process-local cache for service-level lookups
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

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }
}

impl MemoryCache {
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    /// TTL services use when they have no better value
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => {
                let value = serde_json::from_str(&entry.json)
                    .with_context(|| format!("Failed to deserialize cache value for '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        self.cache
            .insert(
                key.to_string(),
                CacheEntry {
                    json: Arc::new(json),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Remove every key matching a glob (`*` any run, `?` one character).
    pub async fn delete_pattern(&self, pattern: &str) {
        let keys: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key)
            .collect();

        tracing::debug!(pattern, removed = keys.len(), "Invalidating cache keys");
        for key in keys {
            self.cache.invalidate(key.as_str()).await;
        }
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Iterative glob matcher with single-star backtracking.
fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if let Some((star_pi, star_ki)) = star {
            pi = star_pi + 1;
            ki = star_ki + 1;
            star = Some((star_pi, star_ki + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::default();
        cache
            .set("post:hello", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();

        let value: Option<Vec<i32>> = cache.get("post:hello").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        cache.delete("post:hello").await;
        let value: Option<Vec<i32>> = cache.get("post:hello").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let cache = MemoryCache::default();
        cache
            .set("k", &"text", Duration::from_secs(60))
            .await
            .unwrap();
        let result: Result<Option<i64>> = cache.get("k").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::default();
        cache
            .set("short", &1, Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set("long", &2, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<i32>("short").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::default();
        let ttl = Duration::from_secs(60);
        cache.set("posts:list:1:10", &1, ttl).await.unwrap();
        cache.set("posts:list:2:10", &2, ttl).await.unwrap();
        cache.set("posts:slug:a", &3, ttl).await.unwrap();

        cache.delete_pattern("posts:list:*").await;

        assert_eq!(cache.get::<i32>("posts:list:1:10").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("posts:list:2:10").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("posts:slug:a").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::default();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.clear().await;
        assert_eq!(cache.get::<i32>("a").await.unwrap(), None);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("posts:*", "posts:list:1"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(!glob_match("posts:*", "tags:1"));
        assert!(!glob_match("a?c", "ac"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_prefix_star_matches_any_suffix(prefix in "[a-z:]{0,8}", suffix in "[a-z0-9:]{0,12}") {
            let key = format!("{}{}", prefix, suffix);
            let pattern = format!("{}*", prefix);
            prop_assert!(glob_match(&pattern, &key));
        }

        #[test]
        fn prop_literal_pattern_matches_only_itself(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            prop_assert_eq!(glob_match(&a, &b), a == b);
        }
    }
}
