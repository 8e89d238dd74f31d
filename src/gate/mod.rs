//! Performance gate
//!
//! Fetches a set of paths from a running server, optionally runs a
//! Lighthouse audit against the base URL, and compares everything against
//! the configured thresholds. `homestead gate` prints the resulting
//! [`GateReport`] and exits 1 when any check fails.

pub mod http;
pub mod lighthouse;
pub mod report;

use thiserror::Error;

pub use http::{check_paths, HttpCheck};
pub use lighthouse::{LighthouseRun, LighthouseScores};
pub use report::{CheckResult, GateReport, Verdict};

use crate::config::GateConfig;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Lighthouse error: {0}")]
    Lighthouse(String),

    #[error("Lighthouse is required but unavailable: {0}")]
    LighthouseRequired(String),

    #[error("Invalid gate configuration: {0}")]
    ValidationError(String),
}

/// Run every check described by `config`.
///
/// A missing Lighthouse binary becomes a skipped row unless
/// `require_lighthouse` is set. A Lighthouse run that starts but fails is
/// recorded as a failed row rather than aborting the HTTP results.
pub async fn run(config: &GateConfig, require_lighthouse: bool) -> Result<GateReport, GateError> {
    if config.paths.is_empty() {
        return Err(GateError::ValidationError(
            "At least one path is required".to_string(),
        ));
    }

    let client = http::build_client()?;
    let mut report = GateReport::default();

    tracing::info!(
        base_url = %config.base_url,
        paths = config.paths.len(),
        "Running HTTP checks"
    );
    for check in check_paths(&client, &config.base_url, &config.paths).await {
        report.extend(check.to_results(&config.thresholds));
    }

    match lighthouse::run_lighthouse(&config.lighthouse_bin, &config.base_url).await {
        Ok(LighthouseRun::Completed(scores)) => {
            report.extend(lighthouse::evaluate(&scores, &config.thresholds));
        }
        Ok(LighthouseRun::Skipped(reason)) if require_lighthouse => {
            return Err(GateError::LighthouseRequired(reason));
        }
        Ok(LighthouseRun::Skipped(reason)) => {
            tracing::warn!(reason = %reason, "Skipping Lighthouse audit");
            report.push(CheckResult::skipped("lighthouse", reason));
        }
        Err(e) => {
            tracing::error!(error = %e, "Lighthouse audit failed");
            report.push(CheckResult::new("lighthouse", e.to_string(), "completed run", false));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_lighthouse(base_url: String) -> GateConfig {
        GateConfig {
            base_url,
            paths: vec!["/ok".to_string()],
            lighthouse_bin: "homestead-no-such-lighthouse".to_string(),
            ..GateConfig::default()
        }
    }

    async fn spawn_ok_server() -> String {
        use axum::{routing::get, Router};

        let app = Router::new().route("/ok", get(|| async { "fine" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_missing_lighthouse_is_skipped() {
        let config = config_without_lighthouse(spawn_ok_server().await);
        let report = run(&config, false).await.unwrap();

        assert!(report.passed());
        let last = report.checks.last().unwrap();
        assert_eq!(last.name, "lighthouse");
        assert_eq!(last.verdict, Verdict::Skip);
    }

    #[tokio::test]
    async fn test_missing_lighthouse_when_required() {
        let config = config_without_lighthouse(spawn_ok_server().await);
        let err = run(&config, true).await.unwrap_err();
        assert!(matches!(err, GateError::LighthouseRequired(_)));
    }

    #[tokio::test]
    async fn test_empty_paths_rejected() {
        let config = GateConfig {
            paths: Vec::new(),
            ..GateConfig::default()
        };
        assert!(matches!(
            run(&config, false).await,
            Err(GateError::ValidationError(_))
        ));
    }
}
