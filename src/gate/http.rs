//! HTTP checks: fetch every configured path and record what came back

use std::time::Instant;

use futures::future::join_all;
use reqwest::header::{HeaderName, ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_ENCODING};
use reqwest::Client;
use serde::Serialize;

use super::report::CheckResult;
use crate::config::GateThresholds;

/// Measurements for one fetched path
#[derive(Debug, Clone, Serialize)]
pub struct HttpCheck {
    pub path: String,
    pub url: String,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    /// Bytes on the wire, before decompression
    pub body_bytes: u64,
    pub cache_control: Option<String>,
    pub content_encoding: Option<String>,
    pub error: Option<String>,
}

impl HttpCheck {
    /// A 2xx status whose body was read in full
    pub fn is_success(&self) -> bool {
        self.error.is_none() && matches!(self.status, Some(code) if (200..300).contains(&code))
    }

    /// Status, time and size rows for the report
    pub fn to_results(&self, thresholds: &GateThresholds) -> Vec<CheckResult> {
        let label = format!("GET {}", self.path);

        let measured_status = match (&self.status, &self.error) {
            (Some(code), Some(err)) => format!("{} (body error: {})", code, err),
            (Some(code), None) => code.to_string(),
            (None, Some(err)) => format!("error: {}", err),
            (None, None) => "no response".to_string(),
        };
        let mut results = vec![CheckResult::new(
            format!("{} status", label),
            measured_status,
            "2xx",
            self.is_success(),
        )];

        // Timing and size are meaningless for a request that never completed
        if self.status.is_none() {
            return results;
        }

        results.push(CheckResult::new(
            format!("{} time", label),
            format!("{} ms", self.elapsed_ms),
            format!("<= {} ms", thresholds.max_response_ms),
            self.elapsed_ms <= thresholds.max_response_ms,
        ));

        // A truncated body has no meaningful size
        if self.error.is_some() {
            return results;
        }

        let encoding = self.content_encoding.as_deref().unwrap_or("identity");
        results.push(CheckResult::new(
            format!("{} size", label),
            format!("{} B ({})", self.body_bytes, encoding),
            format!("<= {} B", thresholds.max_body_bytes),
            self.body_bytes <= thresholds.max_body_bytes,
        ));

        results
    }
}

/// Build the client used by the gate.
///
/// Automatic decompression is off so the recorded size is the transfer
/// size; gzip is still requested explicitly.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("homestead-gate/", env!("CARGO_PKG_VERSION")))
        .no_gzip()
        .timeout(std::time::Duration::from_secs(30))
        .build()
}

/// Join a base URL and a path without doubling the slash
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub async fn check_path(client: &Client, base_url: &str, path: &str) -> HttpCheck {
    let url = join_url(base_url, path);
    let started = Instant::now();

    let mut check = HttpCheck {
        path: path.to_string(),
        url: url.clone(),
        status: None,
        elapsed_ms: 0,
        body_bytes: 0,
        cache_control: None,
        content_encoding: None,
        error: None,
    };

    let response = match client.get(&url).header(ACCEPT_ENCODING, "gzip").send().await {
        Ok(response) => response,
        Err(e) => {
            check.elapsed_ms = started.elapsed().as_millis() as u64;
            check.error = Some(e.to_string());
            tracing::warn!(url = %url, error = %e, "Gate request failed");
            return check;
        }
    };

    check.status = Some(response.status().as_u16());
    let header = |name: HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    check.cache_control = header(CACHE_CONTROL);
    check.content_encoding = header(CONTENT_ENCODING);

    match response.bytes().await {
        Ok(body) => check.body_bytes = body.len() as u64,
        Err(e) => check.error = Some(e.to_string()),
    }
    check.elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::debug!(
        url = %url,
        status = ?check.status,
        elapsed_ms = check.elapsed_ms,
        bytes = check.body_bytes,
        "Gate request finished"
    );
    check
}

/// Fetch every path concurrently; results keep the input order
pub async fn check_paths(client: &Client, base_url: &str, paths: &[String]) -> Vec<HttpCheck> {
    join_all(paths.iter().map(|path| check_path(client, base_url, path))).await
}
