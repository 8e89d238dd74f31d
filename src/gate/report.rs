//! Pass/fail table printed by `homestead gate`

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Skip,
}

impl Verdict {
    fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Skip => "SKIP",
        }
    }
}

/// One measured value compared against its limit
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub measured: String,
    pub limit: String,
    pub verdict: Verdict,
}

impl CheckResult {
    pub fn new(
        name: impl Into<String>,
        measured: impl Into<String>,
        limit: impl Into<String>,
        passed: bool,
    ) -> Self {
        Self {
            name: name.into(),
            measured: measured.into(),
            limit: limit.into(),
            verdict: if passed { Verdict::Pass } else { Verdict::Fail },
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measured: reason.into(),
            limit: "-".to_string(),
            verdict: Verdict::Skip,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GateReport {
    pub checks: Vec<CheckResult>,
}

impl GateReport {
    pub fn push(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    pub fn extend(&mut self, checks: impl IntoIterator<Item = CheckResult>) {
        self.checks.extend(checks);
    }

    /// Skipped checks do not fail the gate
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.verdict != Verdict::Fail)
    }

    pub fn failures(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.verdict == Verdict::Fail)
            .count()
    }
}

fn column_width(
    checks: &[CheckResult],
    header: &str,
    pick: impl Fn(&CheckResult) -> &str,
) -> usize {
    checks
        .iter()
        .map(|c| pick(c).chars().count())
        .max()
        .unwrap_or(0)
        .max(header.len())
}

impl fmt::Display for GateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_w = column_width(&self.checks, "CHECK", |c| c.name.as_str());
        let measured_w = column_width(&self.checks, "MEASURED", |c| c.measured.as_str());
        let limit_w = column_width(&self.checks, "LIMIT", |c| c.limit.as_str());

        writeln!(
            f,
            "{:<name_w$}  {:<measured_w$}  {:<limit_w$}  RESULT",
            "CHECK", "MEASURED", "LIMIT"
        )?;
        for check in &self.checks {
            writeln!(
                f,
                "{:<name_w$}  {:<measured_w$}  {:<limit_w$}  {}",
                check.name,
                check.measured,
                check.limit,
                check.verdict.label()
            )?;
        }

        let total = self.checks.len();
        if self.passed() {
            write!(f, "\nGate passed ({} checks)", total)
        } else {
            write!(f, "\nGate FAILED ({} of {} checks)", self.failures(), total)
        }
    }
}
