//! API middleware
//!
//! Contains the shared application state plus middleware for:
//! - admin authorization (bearer token)
//! - request statistics
//! - HTTP cache headers (`ETag`, `Cache-Control`, conditional GET)

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;

use crate::api::responses::ApiError;
use crate::cache::{create_cache, MemoryCache, ResponseStore};
use crate::config::Config;
use crate::db::repositories::{
    SqlxAirportRepository, SqlxCategoryRepository, SqlxFlightRepository, SqlxPostRepository,
    SqlxProjectRepository, SqlxSkillRepository, SqlxTagRepository, SqlxTestimonialRepository,
    SqlxTripRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    CategoryService, FeedService, FlightService, MarkdownRenderer, PortfolioService, PostService,
    TagService,
};

/// Largest JSON/XML body buffered for ETag computation
const MAX_ETAG_BODY: usize = 4 * 1024 * 1024;

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Sum of response times in microseconds
    total_response_time_us: AtomicU64,
    server_errors: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64, status: StatusCode) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
        if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub cache: Arc<MemoryCache>,
    pub responses: Arc<ResponseStore>,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub tag_service: Arc<TagService>,
    pub feed_service: Arc<FeedService>,
    pub portfolio_service: Arc<PortfolioService>,
    pub flight_service: Arc<FlightService>,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire repositories and services on top of an open, migrated pool
    pub fn new(pool: DynDatabasePool, config: Config) -> Self {
        let cache = create_cache(&config.cache);
        let responses = Arc::new(ResponseStore::new(&config.cache));

        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone());

        let post_service = Arc::new(PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            category_repo.clone(),
            tag_repo.clone(),
            cache.clone(),
            MarkdownRenderer::new(),
        ));
        let feed_service = Arc::new(FeedService::new(post_service.clone(), config.site.clone()));

        Self {
            category_service: Arc::new(CategoryService::new(category_repo, cache.clone())),
            tag_service: Arc::new(TagService::new(tag_repo, cache.clone())),
            portfolio_service: Arc::new(PortfolioService::new(
                SqlxProjectRepository::boxed(pool.clone()),
                SqlxSkillRepository::boxed(pool.clone()),
                SqlxTestimonialRepository::boxed(pool.clone()),
                cache.clone(),
            )),
            flight_service: Arc::new(FlightService::new(
                SqlxAirportRepository::boxed(pool.clone()),
                SqlxFlightRepository::boxed(pool.clone()),
                SqlxTripRepository::boxed(pool.clone()),
                cache.clone(),
            )),
            post_service,
            feed_service,
            request_stats: Arc::new(RequestStats::new()),
            responses,
            cache,
            pool,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Authorization
// ============================================================================

/// Extract a bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Admin authorization middleware
///
/// Writes are refused outright (403) when no admin token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state
        .config
        .admin
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::forbidden("Admin access is disabled"))?;

    let provided = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin token");
        return Err(ApiError::unauthorized("Invalid token"));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Request Statistics Middleware
// ============================================================================

/// Records request count, latency and 5xx count for the health endpoint
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(duration_us, response.status());
    response
}

// ============================================================================
// HTTP Cache Headers
// ============================================================================

/// Generate a strong ETag from content
pub fn generate_etag(content: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

/// `If-None-Match` check; weak and strong forms compare equal, `*` matches
/// anything and a comma-separated list matches if any member does.
pub fn etag_matches(if_none_match: Option<&str>, etag: &str) -> bool {
    let Some(candidates) = if_none_match else {
        return false;
    };
    let etag = etag.trim_start_matches("W/");
    candidates
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
}

/// Build Cache-Control header for API responses
pub fn cache_control_api(max_age: u32, stale_while_revalidate: Option<u32>) -> String {
    match stale_while_revalidate {
        Some(swr) => format!("public, max-age={}, stale-while-revalidate={}", max_age, swr),
        None => format!("public, max-age={}", max_age),
    }
}

fn is_text_payload(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.contains("xml"))
}

/// Adds `ETag` and `Cache-Control` to successful GET JSON/XML responses and
/// answers `If-None-Match` hits with `304 Not Modified`.
pub async fn http_cache_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }
    let if_none_match = request
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;
    if response.status() != StatusCode::OK || !is_text_payload(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_ETAG_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer response for ETag");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !parts.headers.contains_key(header::CACHE_CONTROL) {
        let cache = &state.config.cache;
        let value = cache_control_api(cache.api_max_age, cache.stale_while_revalidate);
        if let Ok(value) = HeaderValue::from_str(&value) {
            parts.headers.insert(header::CACHE_CONTROL, value);
        }
    }

    let etag = match parts.headers.get(header::ETAG).and_then(|v| v.to_str().ok()) {
        Some(existing) => existing.to_string(),
        None => {
            let etag = generate_etag(&bytes);
            if let Ok(value) = HeaderValue::from_str(&etag) {
                parts.headers.insert(header::ETAG, value);
            }
            etag
        }
    };

    if etag_matches(if_none_match.as_deref(), &etag) {
        let mut not_modified = Response::new(Body::empty());
        *not_modified.status_mut() = StatusCode::NOT_MODIFIED;
        for name in [header::ETAG, header::CACHE_CONTROL] {
            if let Some(value) = parts.headers.get(&name) {
                not_modified.headers_mut().insert(name, value.clone());
            }
        }
        return not_modified;
    }

    Response::from_parts(parts, Body::from(bytes))
}

// ============================================================================
// Tests
// ============================================================================
