//! Batch report — per-run counts and retained per-unit failure reasons.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Options shared by every batch job.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Evaluate and report, but write nothing (not even a heartbeat).
    pub dry_run: bool,
    /// Evaluation time used for ages, windows and audit timestamps.
    pub now: DateTime<Utc>,
}

impl RunOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { dry_run: false, now }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A unit that did not complete, with the reason it was retained for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub reason: String,
}

/// Outcome counts for one job run.
///
/// `failed` counts units that were evaluated and did not pass (gate FAIL or
/// FALSIFIED, a write that rolled back). `skipped` counts units that were
/// never evaluated (malformed rows, unmet preconditions).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub job: String,
    pub dry_run: bool,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn new(job: &str, dry_run: bool) -> Self {
        Self {
            job: job.to_string(),
            dry_run,
            ..Self::default()
        }
    }

    pub fn pass(&mut self) {
        self.passed += 1;
    }

    pub fn fail(&mut self, unit_id: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push(UnitFailure {
            unit_id: unit_id.into(),
            reason: reason.into(),
        });
    }

    pub fn skip(&mut self, unit_id: impl Into<String>, reason: impl Into<String>) {
        self.skipped += 1;
        self.failures.push(UnitFailure {
            unit_id: unit_id.into(),
            reason: reason.into(),
        });
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}: {} passed, {} failed, {} skipped",
            self.job,
            if self.dry_run { " (check)" } else { "" },
            self.passed,
            self.failed,
            self.skipped
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.unit_id, failure.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_reasons_accumulate() {
        let mut report = BatchReport::new("gate", false);
        report.pass();
        report.fail("exp-1", "pbo 0.6000 > 0.5000");
        report.skip("exp-2", "not ready");
        assert_eq!(report.total(), 3);
        assert!(!report.all_passed());
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].unit_id, "exp-1");
    }

    #[test]
    fn skips_do_not_count_as_failures() {
        let mut report = BatchReport::new("score", true);
        report.skip("sig-1", "negative factor count");
        assert!(report.all_passed());
        let text = report.to_string();
        assert!(text.starts_with("score (check): 0 passed, 0 failed, 1 skipped"));
        assert!(text.contains("sig-1: negative factor count"));
    }

    #[test]
    fn serializes_to_json() {
        let mut report = BatchReport::new("shadow", false);
        report.pass();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["passed"], 1);
        assert_eq!(json["job"], "shadow");
    }
}
