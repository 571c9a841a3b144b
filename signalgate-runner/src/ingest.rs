//! Ingestion of external feeds into the ledger.
//!
//! - signals: CSV, one row per signal (upsert of producer-owned fields)
//! - hypotheses: JSON Lines, one hypothesis per line; the falsification rule
//!   is parsed here, once
//! - outcomes: CSV; experiments are created implicitly in RUNNING state
//!
//! Every record is its own unit of work. Malformed records are skipped with a
//! reason; only an unreadable file fails the whole feed.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

use signalgate_core::domain::{
    Experiment, ExperimentStatus, FactorFlags, FalsificationCriteria, Hypothesis, Lifecycle, Outcome, Signal,
};

use crate::report::BatchReport;
use crate::store::{Ledger, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Record shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SignalRecord {
    id: String,
    confluence_factor_count: i64,
    sitc_nodes_completed: i64,
    sitc_nodes_total: i64,
    category: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    factor_price: bool,
    #[serde(default)]
    factor_volume: bool,
    #[serde(default)]
    factor_regime: bool,
    #[serde(default)]
    factor_temporal: bool,
    #[serde(default)]
    factor_catalyst: bool,
    #[serde(default)]
    factor_testable: bool,
    #[serde(default)]
    regime: Option<String>,
    lifecycle: String,
}

impl SignalRecord {
    fn into_signal(self) -> Result<Signal, String> {
        if self.id.trim().is_empty() {
            return Err("empty signal id".into());
        }
        let lifecycle: Lifecycle = self.lifecycle.parse()?;
        Ok(Signal {
            id: self.id,
            confluence_factor_count: self.confluence_factor_count,
            sitc_nodes_completed: self.sitc_nodes_completed,
            sitc_nodes_total: self.sitc_nodes_total,
            category: self.category,
            created_at: self.created_at,
            factors: FactorFlags {
                price: self.factor_price,
                volume: self.factor_volume,
                regime: self.factor_regime,
                temporal: self.factor_temporal,
                catalyst: self.factor_catalyst,
                testable: self.factor_testable,
            },
            regime: self.regime.filter(|r| !r.trim().is_empty()),
            lifecycle,
            quality_score: None,
            tier: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct HypothesisRecord {
    id: String,
    statement: String,
    #[serde(default)]
    rationale: String,
    target_asset: String,
    #[serde(default)]
    regime_filter: Option<String>,
    current_confidence: f64,
    #[serde(default)]
    falsification_rule: String,
    #[serde(default)]
    min_sample_size: Option<u32>,
    #[serde(default)]
    take_profit_pct: Option<f64>,
    #[serde(default)]
    trial_count: u32,
    #[serde(default)]
    prior_hypotheses_count: u32,
    #[serde(default)]
    parameter_count: u32,
    #[serde(default)]
    birth_score: Option<f64>,
    created_at: DateTime<Utc>,
}

impl HypothesisRecord {
    fn into_hypothesis(self) -> Result<Hypothesis, String> {
        if self.id.trim().is_empty() {
            return Err("empty hypothesis id".into());
        }
        if self.target_asset.trim().is_empty() {
            return Err(format!("hypothesis {}: empty target asset", self.id));
        }
        if !(0.0..=1.0).contains(&self.current_confidence) {
            return Err(format!(
                "hypothesis {}: confidence {} outside [0, 1]",
                self.id, self.current_confidence
            ));
        }
        Ok(Hypothesis {
            falsification: FalsificationCriteria::declare(self.falsification_rule, self.min_sample_size),
            id: self.id,
            statement: self.statement,
            rationale: self.rationale,
            target_asset: self.target_asset,
            regime_filter: self.regime_filter.filter(|r| !r.trim().is_empty()),
            current_confidence: self.current_confidence,
            take_profit_pct: self.take_profit_pct,
            trial_count: self.trial_count,
            prior_hypotheses_count: self.prior_hypotheses_count,
            parameter_count: self.parameter_count,
            birth_score: self.birth_score,
            created_at: self.created_at,
            tier1_result: None,
            deflated_sharpe_estimate: None,
            pbo_probability: None,
            family_inflation_risk: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OutcomeRecord {
    experiment_id: String,
    hypothesis_id: String,
    won: bool,
    return_pct: f64,
    opened_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
}

// ─── Feeds ───────────────────────────────────────────────────────────

pub fn ingest_signals(ledger: &mut Ledger, path: &Path) -> Result<BatchReport, IngestError> {
    let mut reader = csv_reader(path)?;
    let mut report = BatchReport::new("ingest_signals", false);

    for (i, record) in reader.deserialize::<SignalRecord>().enumerate() {
        let unit = format!("{}:{}", path.display(), i + 2);
        let signal = match record.map_err(|e| e.to_string()).and_then(SignalRecord::into_signal) {
            Ok(s) => s,
            Err(reason) => {
                tracing::warn!(record = %unit, %reason, "skipping signal record");
                report.skip(unit, reason);
                continue;
            }
        };
        match ledger.unit_of_work(|uow| uow.upsert_signal(&signal)) {
            Ok(()) => report.pass(),
            Err(e) => report.fail(&signal.id, e.to_string()),
        }
    }

    tracing::info!(passed = report.passed, skipped = report.skipped, "signals ingested");
    Ok(report)
}

pub fn ingest_hypotheses(ledger: &mut Ledger, path: &Path) -> Result<BatchReport, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut report = BatchReport::new("ingest_hypotheses", false);

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let unit = format!("{}:{}", path.display(), i + 1);
        let parsed = serde_json::from_str::<HypothesisRecord>(&line)
            .map_err(|e| e.to_string())
            .and_then(HypothesisRecord::into_hypothesis);
        let hypothesis = match parsed {
            Ok(h) => h,
            Err(reason) => {
                tracing::warn!(record = %unit, %reason, "skipping hypothesis record");
                report.skip(unit, reason);
                continue;
            }
        };
        match ledger.unit_of_work(|uow| uow.upsert_hypothesis(&hypothesis)) {
            Ok(()) => report.pass(),
            Err(e) => report.fail(&hypothesis.id, e.to_string()),
        }
    }

    tracing::info!(passed = report.passed, skipped = report.skipped, "hypotheses ingested");
    Ok(report)
}

/// Append outcomes. A repeated `(experiment, opened_at)` is skipped, never overwritten.
pub fn ingest_outcomes(ledger: &mut Ledger, path: &Path) -> Result<BatchReport, IngestError> {
    let mut reader = csv_reader(path)?;
    let mut report = BatchReport::new("ingest_outcomes", false);

    for (i, record) in reader.deserialize::<OutcomeRecord>().enumerate() {
        let unit = format!("{}:{}", path.display(), i + 2);
        let record = match record {
            Ok(r) if r.return_pct.is_finite() && !r.experiment_id.trim().is_empty() => r,
            Ok(_) => {
                report.skip(unit, "missing experiment id or non-finite return");
                continue;
            }
            Err(e) => {
                tracing::warn!(record = %unit, error = %e, "skipping outcome record");
                report.skip(unit, e.to_string());
                continue;
            }
        };

        let experiment = Experiment {
            id: record.experiment_id.clone(),
            hypothesis_id: record.hypothesis_id,
            status: ExperimentStatus::Running,
            started_at: record.opened_at,
        };
        let outcome = Outcome {
            experiment_id: record.experiment_id,
            won: record.won,
            return_pct: record.return_pct,
            opened_at: record.opened_at,
            closed_at: record.closed_at,
        };
        let inserted = ledger.unit_of_work(|uow| {
            uow.insert_experiment(&experiment)?;
            uow.insert_outcome(&outcome)
        });
        match inserted {
            Ok(true) => report.pass(),
            Ok(false) => report.skip(unit, format!("duplicate outcome for {}", outcome.experiment_id)),
            Err(e) => report.fail(unit, e.to_string()),
        }
    }

    tracing::info!(passed = report.passed, skipped = report.skipped, "outcomes ingested");
    Ok(report)
}

fn csv_reader(path: &Path) -> Result<csv::Reader<File>, IngestError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| IngestError::Csv {
            path: path.display().to_string(),
            source,
        })
}
