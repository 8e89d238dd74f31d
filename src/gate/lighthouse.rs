//! Lighthouse audit: run the CLI and pull the numbers the gate compares

use std::io::ErrorKind;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;

use super::report::CheckResult;
use super::GateError;
use crate::config::GateThresholds;

/// Scores pulled from a Lighthouse run. Metrics absent from the
/// output stay `None` and are reported as skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LighthouseScores {
    /// 0-100
    pub performance: Option<f64>,
    pub lcp_ms: Option<f64>,
    pub cls: Option<f64>,
    pub tbt_ms: Option<f64>,
}

impl LighthouseScores {
    fn is_empty(&self) -> bool {
        self.performance.is_none()
            && self.lcp_ms.is_none()
            && self.cls.is_none()
            && self.tbt_ms.is_none()
    }
}

/// Outcome of trying to run the audit
#[derive(Debug)]
pub enum LighthouseRun {
    Completed(LighthouseScores),
    /// The binary is not installed
    Skipped(String),
}

/// Parse the report produced by `--output=json`
pub fn parse_json_report(raw: &str) -> Result<LighthouseScores, GateError> {
    let report: Value = serde_json::from_str(raw)
        .map_err(|e| GateError::Lighthouse(format!("Invalid JSON report: {}", e)))?;

    let audit = |id: &str| report["audits"][id]["numericValue"].as_f64();

    let scores = LighthouseScores {
        performance: report["categories"]["performance"]["score"]
            .as_f64()
            .map(|s| (s * 100.0).round()),
        lcp_ms: audit("largest-contentful-paint"),
        cls: audit("cumulative-layout-shift"),
        tbt_ms: audit("total-blocking-time"),
    };

    if scores.is_empty() {
        return Err(GateError::Lighthouse(
            "Report contains no performance data".to_string(),
        ));
    }
    Ok(scores)
}

/// Parse a plain-text summary such as
///
/// ```text
/// Performance: 93
/// Largest Contentful Paint: 1800 ms
/// Cumulative Layout Shift: 0.02
/// Total Blocking Time: 120 ms
/// ```
pub fn parse_text_summary(raw: &str) -> Result<LighthouseScores, GateError> {
    let grab = |pattern: &str| -> Result<Option<(f64, Option<String>)>, GateError> {
        let re = Regex::new(pattern)
            .map_err(|e| GateError::Lighthouse(format!("Invalid pattern: {}", e)))?;
        Ok(re.captures(raw).and_then(|caps| {
            let value = caps.get(1)?.as_str().replace(',', "").parse::<f64>().ok()?;
            let unit = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
            Some((value, unit))
        }))
    };
    // Timings print as "1,800 ms" or "4.8 s"; a bare number is milliseconds
    let millis = |pattern: &str| -> Result<Option<f64>, GateError> {
        Ok(grab(pattern)?.map(|(value, unit)| match unit.as_deref() {
            Some("s") => value * 1000.0,
            _ => value,
        }))
    };

    let scores = LighthouseScores {
        performance: grab(r"(?i)performance:\s*(\d+(?:\.\d+)?)")?.map(|(v, _)| v),
        lcp_ms: millis(r"(?i)largest contentful paint:\s*(\d[\d,]*(?:\.\d+)?)[ \t]*(ms|s)?\b")?,
        cls: grab(r"(?i)cumulative layout shift:\s*(\d+(?:\.\d+)?)")?.map(|(v, _)| v),
        tbt_ms: millis(r"(?i)total blocking time:\s*(\d[\d,]*(?:\.\d+)?)[ \t]*(ms|s)?\b")?,
    };

    if scores.is_empty() {
        return Err(GateError::Lighthouse(
            "Could not find any scores in Lighthouse output".to_string(),
        ));
    }
    Ok(scores)
}

/// JSON first, text summary as the fallback
pub fn parse_output(raw: &str) -> Result<LighthouseScores, GateError> {
    match parse_json_report(raw) {
        Ok(scores) => Ok(scores),
        Err(json_err) => {
            tracing::debug!(error = %json_err, "Lighthouse output is not a JSON report");
            parse_text_summary(raw)
        }
    }
}

pub async fn run_lighthouse(bin: &str, url: &str) -> Result<LighthouseRun, GateError> {
    tracing::info!(bin = %bin, url = %url, "Running Lighthouse");

    let output = match Command::new(bin)
        .arg(url)
        .arg("--output=json")
        .arg("--quiet")
        .arg("--chrome-flags=--headless")
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(LighthouseRun::Skipped(format!("{} not found", bin)));
        }
        Err(e) => {
            return Err(GateError::Lighthouse(format!(
                "Failed to start {}: {}",
                bin, e
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GateError::Lighthouse(format!(
            "{} exited with {}: {}",
            bin,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_output(&stdout).map(LighthouseRun::Completed)
}

/// Compare scores against thresholds
pub fn evaluate(scores: &LighthouseScores, thresholds: &GateThresholds) -> Vec<CheckResult> {
    fn row(
        name: &str,
        value: Option<f64>,
        measured: impl Fn(f64) -> String,
        limit: String,
        passes: impl Fn(f64) -> bool,
    ) -> CheckResult {
        match value {
            Some(v) => CheckResult::new(name, measured(v), limit, passes(v)),
            None => CheckResult::skipped(name, "not reported"),
        }
    }

    vec![
        row(
            "lighthouse performance",
            scores.performance,
            |v| format!("{:.0}", v),
            format!(">= {:.0}", thresholds.min_performance),
            |v| v >= thresholds.min_performance,
        ),
        row(
            "lighthouse LCP",
            scores.lcp_ms,
            |v| format!("{:.0} ms", v),
            format!("<= {:.0} ms", thresholds.max_lcp_ms),
            |v| v <= thresholds.max_lcp_ms,
        ),
        row(
            "lighthouse CLS",
            scores.cls,
            |v| format!("{:.3}", v),
            format!("<= {:.3}", thresholds.max_cls),
            |v| v <= thresholds.max_cls,
        ),
        row(
            "lighthouse TBT",
            scores.tbt_ms,
            |v| format!("{:.0} ms", v),
            format!("<= {:.0} ms", thresholds.max_tbt_ms),
            |v| v <= thresholds.max_tbt_ms,
        ),
    ]
}
