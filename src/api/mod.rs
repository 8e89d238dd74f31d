//! API layer - HTTP handlers and routing
//!
//! JSON endpoints live under `/api`, the RSS feed at `/rss.xml`, and
//! everything else falls through to the static front-end build. All GET
//! traffic passes through the response caching strategies.

pub mod blog;
pub mod extract;
pub mod flights;
pub mod health;
pub mod middleware;
pub mod portfolio;
pub mod responses;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::cache::CacheStrategyLayer;

pub use middleware::{AppState, RequestStats};
pub use responses::{ApiError, ApiResponse};

/// Require the admin bearer token on `route`
fn admin_only(route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
    route.route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::require_admin,
    ))
}

/// Build the API router
pub fn build_api_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health::health))
        // Blog
        .route(
            "/api/blog",
            get(blog::list_posts).merge(admin_only(post(blog::create_post), state)),
        )
        .route("/api/blog/search", get(blog::search_posts))
        .route(
            "/api/blog/categories",
            get(blog::list_categories).merge(admin_only(post(blog::create_category), state)),
        )
        .route(
            "/api/blog/categories/{id}",
            admin_only(axum::routing::delete(blog::delete_category), state),
        )
        .route("/api/blog/tags", get(blog::tag_cloud))
        .route("/api/blog/tags/{slug}", get(blog::posts_by_tag))
        // GET takes a slug, PUT/DELETE a numeric id
        .route(
            "/api/blog/{post}",
            get(blog::get_post).merge(admin_only(
                axum::routing::put(blog::update_post).delete(blog::delete_post),
                state,
            )),
        )
        // Portfolio
        .route("/api/portfolio", get(portfolio::overview))
        .route("/api/portfolio/search", get(portfolio::search))
        .route(
            "/api/portfolio/projects",
            get(portfolio::list_projects).merge(admin_only(post(portfolio::create_project), state)),
        )
        .route(
            "/api/portfolio/projects/{project}",
            get(portfolio::get_project).merge(admin_only(
                axum::routing::put(portfolio::update_project).delete(portfolio::delete_project),
                state,
            )),
        )
        .route(
            "/api/portfolio/skills",
            get(portfolio::list_skills).merge(admin_only(post(portfolio::create_skill), state)),
        )
        .route(
            "/api/portfolio/skills/{id}",
            admin_only(axum::routing::delete(portfolio::delete_skill), state),
        )
        .route(
            "/api/portfolio/testimonials",
            get(portfolio::list_testimonials)
                .merge(admin_only(post(portfolio::create_testimonial), state)),
        )
        .route(
            "/api/portfolio/testimonials/{id}",
            admin_only(axum::routing::delete(portfolio::delete_testimonial), state),
        )
        // Flights
        .route(
            "/api/flights",
            get(flights::list_flights).merge(admin_only(post(flights::create_flight), state)),
        )
        .route("/api/flights/stats", get(flights::stats))
        .route(
            "/api/flights/{id}",
            admin_only(axum::routing::delete(flights::delete_flight), state),
        )
        .route(
            "/api/airports",
            get(flights::list_airports).merge(admin_only(post(flights::create_airport), state)),
        )
        .route(
            "/api/trips",
            get(flights::list_trips).merge(admin_only(post(flights::create_trip), state)),
        )
        .route("/api/trips/{slug}", get(flights::get_trip))
        .route("/api/{*path}", axum::routing::any(api_not_found))
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::IF_NONE_MATCH])
        .expose_headers([
            header::ETAG,
            HeaderName::from_static(crate::cache::layer::X_CACHE),
            HeaderName::from_static(crate::cache::layer::X_CACHE_STALE),
            HeaderName::from_static(crate::cache::layer::X_CACHE_DATE),
        ]);

    if origin == "*" {
        return cors.allow_origin(tower_http::cors::Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(%origin, "Invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}

/// Build the complete router with middleware
///
/// Layers, outermost first: request stats, tracing, CORS, compression,
/// conditional GET, caching strategies.
pub fn build_router(state: AppState) -> Router {
    let public_dir = state.config.server.public_dir.clone();
    let cors = cors_layer(&state.config.server.cors_origin);

    build_api_router(&state)
        .route("/rss.xml", get(blog::rss_feed))
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(CacheStrategyLayer::new(state.responses.clone()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::http_cache_headers,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::layer::X_CACHE;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use axum::body::Body;
    use axum::http::{self, Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret";

    async fn setup(token: Option<&str>) -> (Router, AppState, tempfile::TempDir) {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let public = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("index.html"), "<h1>home</h1>").unwrap();

        let mut config = Config::default();
        config.admin.token = token.map(str::to_string);
        config.server.public_dir = public.path().to_path_buf();
        config.site.url = "https://example.dev".into();

        let state = AppState::new(pool, config);
        (build_router(state.clone()), state, public)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _dir) = setup(None).await;
        let response = app.oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["database"], "sqlite");
    }

    #[tokio::test]
    async fn test_health_reports_unavailable_database() {
        let (app, state, _dir) = setup(None).await;
        state.pool.close().await;
        let response = app.oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_writes_forbidden_without_configured_token() {
        let (app, _, _dir) = setup(None).await;
        let response = app
            .oneshot(json_req(
                Method::POST,
                "/api/blog",
                Some("anything"),
                json!({"title": "x", "content": "y"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_writes_require_matching_token() {
        let (app, _, _dir) = setup(Some(TOKEN)).await;

        let missing = app
            .clone()
            .oneshot(json_req(Method::POST, "/api/blog", None, json!({})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(json_req(Method::POST, "/api/blog", Some("nope"), json!({})))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_publish_and_read_post() {
        let (app, _, _dir) = setup(Some(TOKEN)).await;

        let response = app
            .clone()
            .oneshot(json_req(
                Method::POST,
                "/api/blog",
                Some(TOKEN),
                json!({
                    "title": "Hello World",
                    "content": "Some **bold** words.",
                    "status": "published",
                    "tags": ["rust"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert!(created["data"]["published_at"].is_string());
        let id = created["data"]["id"].as_i64().unwrap();

        let response = app.clone().oneshot(get_req("/api/blog/hello-world")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["title"], "Hello World");
        assert_eq!(json["data"]["tags"][0]["slug"], "rust");

        let response = app.clone().oneshot(get_req("/api/blog?tag=rust")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["data"]["total"], 1);
        assert_eq!(json["data"]["has_next"], false);
        assert_eq!(json["data"]["has_prev"], false);

        let response = app
            .clone()
            .oneshot(json_req(
                Method::PUT,
                &format!("/api/blog/{}", id),
                Some(TOKEN),
                json!({"status": "draft"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_req("/api/blog/hello-world")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_and_not_found_envelopes() {
        let (app, _, _dir) = setup(Some(TOKEN)).await;

        let response = app.clone().oneshot(get_req("/api/blog/search?q=%20")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

        let response = app.clone().oneshot(get_req("/api/portfolio/search?q=a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(get_req("/api/blog/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");

        let response = app.oneshot(get_req("/api/nothing/here")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_envelope() {
        let (app, _, _dir) = setup(Some(TOKEN)).await;

        let response = app
            .clone()
            .oneshot(json_req(Method::PUT, "/api/blog/abc", Some(TOKEN), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/api/blog")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

        let response = app.clone().oneshot(get_req("/api/blog?page=-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

        let response = app
            .oneshot(json_req(Method::DELETE, "/api/flights/xyz", Some(TOKEN), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_duplicate_category_conflicts() {
        let (app, _, _dir) = setup(Some(TOKEN)).await;
        let create = || json_req(Method::POST, "/api/blog/categories", Some(TOKEN), json!({"name": "Rust"}));

        let first = app.clone().oneshot(create()).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = app.oneshot(create()).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_etag_and_not_modified() {
        let (app, _, _dir) = setup(None).await;

        let response = app.clone().oneshot(get_req("/api/portfolio")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let etag = response.headers().get(header::ETAG).cloned().unwrap();
        let cache_control = response.headers().get(header::CACHE_CONTROL).unwrap();
        assert!(cache_control.to_str().unwrap().contains("max-age="));

        let request = Request::get("/api/portfolio")
            .header(header::IF_NONE_MATCH, etag.clone())
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers().get(header::ETAG), Some(&etag));
    }

    #[tokio::test]
    async fn test_api_responses_carry_cache_outcome() {
        let (app, _, _dir) = setup(None).await;

        let first = app.clone().oneshot(get_req("/api/flights/stats")).await.unwrap();
        assert_eq!(first.headers()[X_CACHE], "MISS");
        let second = app.oneshot(get_req("/api/flights/stats")).await.unwrap();
        assert_eq!(second.headers()[X_CACHE], "REVALIDATED");
    }

    #[tokio::test]
    async fn test_api_falls_back_to_stored_copy() {
        let (app, state, _dir) = setup(None).await;

        let first = app.clone().oneshot(get_req("/api/trips")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        state.pool.close().await;
        let fallback = app.oneshot(get_req("/api/trips")).await.unwrap();
        assert_eq!(fallback.status(), StatusCode::OK);
        assert_eq!(fallback.headers()[X_CACHE], "STALE");
        assert_eq!(fallback.headers()["x-cache-stale"], "true");
    }

    #[tokio::test]
    async fn test_rss_feed() {
        let (app, _, _dir) = setup(None).await;
        let response = app.oneshot(get_req("/rss.xml")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("application/rss+xml"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("<link>https://example.dev</link>"));
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let (app, _, _dir) = setup(None).await;
        let response = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE], "BYPASS");
    }
}
