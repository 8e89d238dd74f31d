//! Tower layer applying the response caching strategies
//!
//! Every response leaving the layer carries an `x-cache` header:
//!
//! | value         | meaning                                                   |
//! |---------------|-----------------------------------------------------------|
//! | `HIT`         | served from the store                                     |
//! | `MISS`        | fetched, nothing stored before                            |
//! | `REVALIDATED` | fetched, replacing an older stored copy                   |
//! | `STALE`       | fetch failed, stored copy served (`x-cache-stale: true`)  |
//! | `BYPASS`      | not cacheable (non-GET, network-only or `no-store`)       |

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{self, header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

use super::strategy::{CachedResponse, RequestClass, ResponseStore, Strategy};

pub const X_CACHE: &str = "x-cache";
pub const X_CACHE_STALE: &str = "x-cache-stale";
pub const X_CACHE_DATE: &str = "x-cache-date";

/// Largest body the layer will buffer and store
const MAX_CACHED_BODY: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Hit,
    Miss,
    Revalidated,
    Stale,
    Bypass,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Hit => "HIT",
            Outcome::Miss => "MISS",
            Outcome::Revalidated => "REVALIDATED",
            Outcome::Stale => "STALE",
            Outcome::Bypass => "BYPASS",
        }
    }
}

#[derive(Clone)]
pub struct CacheStrategyLayer {
    store: Arc<ResponseStore>,
}

impl CacheStrategyLayer {
    pub fn new(store: Arc<ResponseStore>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for CacheStrategyLayer {
    type Service = CacheStrategyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CacheStrategyService {
            inner,
            store: self.store.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CacheStrategyService<S> {
    inner: S,
    store: Arc<ResponseStore>,
}

impl<S> Service<Request> for CacheStrategyService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Take the service that was driven to readiness and leave a fresh clone.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let store = self.store.clone();

        Box::pin(async move {
            if req.method() != Method::GET {
                return Ok(mark(inner.oneshot(req).await?, Outcome::Bypass));
            }

            let class = RequestClass::classify(req.uri().path());
            let key = cache_key(&req);

            let response = match class.strategy() {
                Strategy::NetworkOnly => mark(inner.oneshot(req).await?, Outcome::Bypass),
                Strategy::CacheFirst => cache_first(inner, store, class, key, req).await,
                Strategy::NetworkFirst => network_first(inner, store, class, key, req).await,
                Strategy::StaleWhileRevalidate => {
                    stale_while_revalidate(inner, store, class, key, req).await
                }
            };
            Ok(response)
        })
    }
}

fn cache_key(req: &Request) -> String {
    match req.uri().query() {
        Some(query) => format!("{}?{}", req.uri().path(), query),
        None => req.uri().path().to_string(),
    }
}

async fn cache_first<S>(
    inner: S,
    store: Arc<ResponseStore>,
    class: RequestClass,
    key: String,
    req: Request,
) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    if let Some(cached) = store.get(class, &key) {
        tracing::trace!(%key, "Cache-first hit");
        return mark(build_response(cached, &store, class), Outcome::Hit);
    }

    let response = match inner.oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    store_if_ok(&store, class, &key, response).await.0
}

async fn network_first<S>(
    inner: S,
    store: Arc<ResponseStore>,
    class: RequestClass,
    key: String,
    req: Request,
) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    let response = match inner.oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if !response.status().is_server_error() {
        return store_if_ok(&store, class, &key, response).await.0;
    }

    match store.get(class, &key) {
        Some(cached) => {
            tracing::warn!(
                %key,
                status = response.status().as_u16(),
                "Upstream failed, serving stored copy"
            );
            let stored_at = cached.stored_at;
            let mut fallback = mark(build_response(cached, &store, class), Outcome::Stale);
            let headers = fallback.headers_mut();
            headers.insert(X_CACHE_STALE, HeaderValue::from_static("true"));
            if let Ok(date) = HeaderValue::from_str(&stored_at.to_rfc2822()) {
                headers.insert(X_CACHE_DATE, date);
            }
            fallback
        }
        None => mark(response, Outcome::Miss),
    }
}

async fn stale_while_revalidate<S>(
    inner: S,
    store: Arc<ResponseStore>,
    class: RequestClass,
    key: String,
    req: Request,
) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible> + Send + 'static,
    S::Future: Send + 'static,
{
    let Some(cached) = store.get(class, &key) else {
        let response = match inner.oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        return store_if_ok(&store, class, &key, response).await.0;
    };

    if store.begin_refresh(&key) {
        let refresh = http::Request::builder()
            .method(Method::GET)
            .uri(req.uri().clone())
            .body(Body::empty());
        match refresh {
            Ok(refresh) => {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let response = match inner.oneshot(refresh).await {
                        Ok(response) => response,
                        Err(never) => match never {},
                    };
                    let status = response.status();
                    store_if_ok(&store, class, &key, response).await;
                    store.end_refresh(&key);
                    tracing::debug!(%key, status = status.as_u16(), "Background refresh finished");
                });
            }
            Err(e) => {
                store.end_refresh(&key);
                tracing::warn!(%key, error = %e, "Could not build refresh request");
            }
        }
    }

    mark(build_response(cached, &store, class), Outcome::Hit)
}

/// Buffer and store a 200 response. Returns the response to send and
/// whether it was stored.
async fn store_if_ok(
    store: &ResponseStore,
    class: RequestClass,
    key: &str,
    response: Response,
) -> (Response, bool) {
    if response.status() != StatusCode::OK {
        return (mark(response, Outcome::Miss), false);
    }

    let no_store = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("no-store"));
    if no_store {
        return (mark(response, Outcome::Bypass), false);
    }

    let too_large = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len > MAX_CACHED_BODY);
    if too_large {
        return (mark(response, Outcome::Miss), false);
    }

    let (mut parts, body) = response.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%key, error = %e, "Failed to buffer response body");
            return (
                mark(StatusCode::INTERNAL_SERVER_ERROR.into_response(), Outcome::Miss),
                false,
            );
        }
    };

    apply_default_cache_control(&mut parts.headers, store, class);

    let replaced = store.put(
        class,
        key,
        CachedResponse {
            status: parts.status,
            headers: parts.headers.clone(),
            body: bytes.clone(),
            stored_at: Utc::now(),
        },
    );

    let outcome = if replaced {
        Outcome::Revalidated
    } else {
        Outcome::Miss
    };
    (mark(Response::from_parts(parts, Body::from(bytes)), outcome), true)
}

fn apply_default_cache_control(
    headers: &mut axum::http::HeaderMap,
    store: &ResponseStore,
    class: RequestClass,
) {
    if headers.contains_key(header::CACHE_CONTROL) {
        return;
    }
    let value = match class {
        RequestClass::StaticAsset | RequestClass::Image => &store.asset_cache_control,
        RequestClass::BlogPage => &store.page_cache_control,
        RequestClass::Api | RequestClass::Other => return,
    };
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

fn build_response(cached: CachedResponse, store: &ResponseStore, class: RequestClass) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;
    *response.headers_mut() = cached.headers;
    apply_default_cache_control(response.headers_mut(), store, class);
    response
}

fn mark(mut response: Response, outcome: Outcome) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(outcome.as_str()));
    response
}
