//! GET /api/health - database reachability plus request statistics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::api::middleware::AppState;
use crate::api::responses::{ok, ApiError};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub server_errors: u64,
    pub avg_response_time_ms: f64,
    pub cached_entries: u64,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let no_store = [(header::CACHE_CONTROL, "no-store")];

    if let Err(e) = state.pool.ping().await {
        tracing::error!(error = ?e, "Health check: database unreachable");
        return (no_store, ApiError::unavailable("Database unreachable")).into_response();
    }

    let stats = &state.request_stats;
    let body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database: state.pool.driver().as_str(),
        uptime_seconds: stats.uptime_seconds(),
        total_requests: stats.total_requests(),
        server_errors: stats.server_errors(),
        avg_response_time_ms: (stats.avg_response_time_us() / 10.0).round() / 100.0,
        cached_entries: state.cache.entry_count(),
    };
    (StatusCode::OK, no_store, ok(body)).into_response()
}
