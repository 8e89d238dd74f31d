//! Response caching strategies
//!
//! Each GET request is classified by path and extension into a
//! [`RequestClass`], which picks the [`Strategy`] applied by
//! [`super::layer::CacheStrategyLayer`]. Stored responses live in a
//! [`ResponseStore`] with one insertion-ordered bucket per class.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::config::CacheConfig;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"];

const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot", "map", "wasm", "webmanifest",
];

/// Prefixes under which the front-end build emits fingerprinted assets
const STATIC_PREFIXES: &[&str] = &["/_astro/", "/assets/", "/static/"];

/// Entry cap for buckets without a dedicated limit
const DEFAULT_BUCKET_CAP: usize = 1_000;

/// Kind of resource a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    StaticAsset,
    Image,
    Api,
    BlogPage,
    Other,
}

/// How a request class is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve the stored copy when present, otherwise fetch and store
    CacheFirst,
    /// Fetch; fall back to the stored copy when the fetch fails
    NetworkFirst,
    /// Serve the stored copy immediately and refresh it in the background
    StaleWhileRevalidate,
    /// Never cached
    NetworkOnly,
}

impl RequestClass {
    pub fn classify(path: &str) -> Self {
        if path == "/api" || path.starts_with("/api/") {
            return RequestClass::Api;
        }

        let extension = path
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => return RequestClass::Image,
            Some(ext) if STATIC_EXTENSIONS.contains(&ext) => return RequestClass::StaticAsset,
            _ => {}
        }

        if STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            return RequestClass::StaticAsset;
        }

        let is_page = matches!(extension.as_deref(), None | Some("html") | Some("xml"));
        if is_page && (path == "/blog" || path.starts_with("/blog/") || path == "/rss.xml") {
            return RequestClass::BlogPage;
        }

        RequestClass::Other
    }

    pub fn strategy(self) -> Strategy {
        match self {
            RequestClass::StaticAsset | RequestClass::Image => Strategy::CacheFirst,
            RequestClass::Api => Strategy::NetworkFirst,
            RequestClass::BlogPage => Strategy::StaleWhileRevalidate,
            RequestClass::Other => Strategy::NetworkOnly,
        }
    }
}

/// A buffered successful response
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

#[derive(Default)]
struct Bucket {
    entries: HashMap<String, CachedResponse>,
    /// Keys, oldest first
    order: VecDeque<String>,
}

impl Bucket {
    fn insert(&mut self, key: String, response: CachedResponse) {
        if self.entries.insert(key.clone(), response).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
    }

    /// Drop `batch` oldest entries once the bucket holds more than `cap`.
    fn trim(&mut self, cap: usize, batch: usize) -> usize {
        if self.entries.len() <= cap {
            return 0;
        }
        let mut evicted = 0;
        while evicted < batch {
            match self.order.pop_front() {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<RequestClass, Bucket>,
    refreshing: HashSet<String>,
}

/// Responses stored by the strategy layer
pub struct ResponseStore {
    state: Mutex<StoreState>,
    image_cap: usize,
    image_evict_batch: usize,
    /// `Cache-Control` for static assets and images without one
    pub asset_cache_control: String,
    /// `Cache-Control` for blog pages without one
    pub page_cache_control: String,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        let page_cache_control = match config.stale_while_revalidate {
            Some(swr) => format!("public, max-age=0, stale-while-revalidate={}", swr),
            None => "public, max-age=0, must-revalidate".to_string(),
        };
        Self {
            state: Mutex::new(StoreState::default()),
            image_cap: config.image_cap,
            image_evict_batch: config.image_evict_batch,
            asset_cache_control: format!(
                "public, max-age={}, immutable",
                config.static_max_age
            ),
            page_cache_control,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, class: RequestClass, key: &str) -> Option<CachedResponse> {
        self.lock()
            .buckets
            .get(&class)
            .and_then(|bucket| bucket.entries.get(key))
            .cloned()
    }

    /// Store a response, returning whether an older copy was replaced.
    pub fn put(&self, class: RequestClass, key: &str, response: CachedResponse) -> bool {
        let (cap, batch) = match class {
            RequestClass::Image => (self.image_cap, self.image_evict_batch),
            _ => (DEFAULT_BUCKET_CAP, 1),
        };

        let mut state = self.lock();
        let bucket = state.buckets.entry(class).or_default();
        let replaced = bucket.entries.contains_key(key);
        bucket.insert(key.to_string(), response);
        let evicted = bucket.trim(cap, batch);
        if evicted > 0 {
            tracing::debug!(?class, evicted, "Trimmed response cache bucket");
        }
        replaced
    }

    pub fn len(&self, class: RequestClass) -> usize {
        self.lock()
            .buckets
            .get(&class)
            .map_or(0, |bucket| bucket.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.lock()
            .buckets
            .values()
            .all(|bucket| bucket.entries.is_empty())
    }

    /// Claim the background refresh of `key`. False when one is already running.
    pub fn begin_refresh(&self, key: &str) -> bool {
        self.lock().refreshing.insert(key.to_string())
    }

    pub fn end_refresh(&self, key: &str) {
        self.lock().refreshing.remove(key);
    }

    /// Drop every stored response
    pub fn clear(&self) {
        self.lock().buckets.clear();
    }
}
