//! Percentile scoring job.
//!
//! Loads every signal, lets the scorer decide on the evaluable population and
//! persists the result. A hard stop writes one hard-stop audit row and no
//! scores. Otherwise each scored row is its own unit of work: the audit upsert
//! and the signal's score/tier update commit or roll back together.

use serde::Serialize;

use signalgate_core::scoring::{HardStop, PercentileQualityScorer, ScoreBatchResult};

use crate::heartbeat;
use crate::report::{BatchReport, RunOptions};
use crate::store::{Ledger, StoreError};

pub const JOB_NAME: &str = "percentile_scoring";

/// Outcome of a scoring run. The hard stop is a distinct value, never a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScoringRun {
    Scored(BatchReport),
    HardStopped(HardStop),
}

impl ScoringRun {
    pub fn is_hard_stopped(&self) -> bool {
        matches!(self, ScoringRun::HardStopped(_))
    }
}

/// Score the ledger's signal population.
///
/// Only reading the population can fail the run as a whole; per-row write
/// failures are rolled back and reported.
pub fn run_scoring(
    ledger: &mut Ledger,
    scorer: &PercentileQualityScorer,
    opts: RunOptions,
) -> Result<ScoringRun, StoreError> {
    let signals = ledger.signals()?;
    tracing::info!(
        signals = signals.len(),
        formula_hash = %scorer.formula_hash(),
        dry_run = opts.dry_run,
        "scoring run started"
    );

    let run = match scorer.score(&signals, opts.now) {
        ScoreBatchResult::HardStopped(stop) => {
            if !opts.dry_run {
                ledger.unit_of_work(|uow| uow.insert_hard_stop(&stop, scorer.formula_hash(), opts.now))?;
            }
            ScoringRun::HardStopped(stop)
        }
        ScoreBatchResult::Scored(batch) => {
            let mut report = BatchReport::new(JOB_NAME, opts.dry_run);
            for row_error in &batch.skipped {
                report.skip(row_error.signal_id(), row_error.to_string());
            }

            for score in &batch.scores {
                if opts.dry_run {
                    report.pass();
                    continue;
                }
                let written = ledger.unit_of_work(|uow| {
                    uow.upsert_score_audit(score, opts.now)?;
                    uow.set_signal_score(&score.signal_id, score.quality_score, score.tier)
                });
                match written {
                    Ok(()) => report.pass(),
                    Err(e) => {
                        tracing::warn!(signal_id = %score.signal_id, error = %e, "score write rolled back");
                        report.fail(&score.signal_id, e.to_string());
                    }
                }
            }

            tracing::info!(
                passed = report.passed,
                failed = report.failed,
                skipped = report.skipped,
                non_dominant_pct = batch.diversity.non_dominant_pct,
                "scoring run finished"
            );
            ScoringRun::Scored(report)
        }
    };

    heartbeat::beat(ledger, JOB_NAME, &opts);
    Ok(run)
}
