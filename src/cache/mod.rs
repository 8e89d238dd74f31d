//! Caching
//!
//! Two caches live here:
//! - [`MemoryCache`]: a moka-backed key/value cache services use for
//!   cache-aside lookups of posts, taxonomies and stats.
//! - [`CacheStrategyLayer`]: a tower layer that stores whole HTTP responses
//!   and serves them according to the per-class [`Strategy`].

pub mod layer;
pub mod memory;
pub mod strategy;

use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use layer::CacheStrategyLayer;
pub use memory::MemoryCache;
pub use strategy::{CachedResponse, RequestClass, ResponseStore, Strategy};

/// Build the data cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    tracing::debug!(
        max_capacity = config.max_capacity,
        ttl_seconds = config.ttl_seconds,
        "Creating memory cache"
    );
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_uses_configured_ttl() {
        let config = CacheConfig {
            ttl_seconds: 1800,
            ..CacheConfig::default()
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(1800));

        cache
            .set("key", "value", cache.default_ttl())
            .await
            .unwrap();
        let value: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(value.as_deref(), Some("value"));
    }
}
