//! Forced-exploration pass.
//!
//! A labeled override for young hypotheses with a top-quantile birth score and
//! no audit history. Each selected hypothesis gets one EXPLORATION_PASS
//! promotion audit row under its own gate name. No eligibility is written,
//! ever.

use serde::Serialize;

use signalgate_core::config::GateConfig;
use signalgate_core::gate::select_exploration_candidates;
use signalgate_core::hashing::content_hash;

use crate::heartbeat;
use crate::report::{BatchReport, RunOptions};
use crate::store::{Ledger, PromotionAuditRow, StoreError};

pub const JOB_NAME: &str = "forced_exploration";

#[derive(Debug, Serialize)]
struct ExplorationInput<'a> {
    hypothesis_id: &'a str,
    birth_score: f64,
    cutoff: f64,
}

/// Report plus the selected ids and the cutoff they cleared.
#[derive(Debug, Clone, Serialize)]
pub struct ExplorationRun {
    pub report: BatchReport,
    /// `None` when no hypothesis carries a birth score.
    pub cutoff: Option<f64>,
    pub selected: Vec<String>,
}

pub fn run_exploration(ledger: &mut Ledger, gate: &GateConfig, opts: RunOptions) -> Result<ExplorationRun, StoreError> {
    let hypotheses = ledger.hypotheses()?;
    let audited = ledger.audited_hypotheses()?;
    let selection = select_exploration_candidates(&hypotheses, &audited, gate.exploration_quantile);

    let mut run = ExplorationRun {
        report: BatchReport::new(JOB_NAME, opts.dry_run),
        cutoff: selection.cutoff.is_finite().then_some(selection.cutoff),
        selected: Vec::new(),
    };

    for h in selection.candidates {
        let Some(birth_score) = h.birth_score else {
            continue;
        };
        tracing::warn!(
            hypothesis_id = %h.id,
            birth_score,
            cutoff = selection.cutoff,
            "forced exploration pass: statistical thresholds bypassed"
        );
        run.selected.push(h.id.clone());

        if opts.dry_run {
            run.report.pass();
            continue;
        }
        let input_hash = content_hash(&ExplorationInput {
            hypothesis_id: &h.id,
            birth_score,
            cutoff: selection.cutoff,
        });
        let row = PromotionAuditRow::exploration(&h.id, birth_score, selection.cutoff, &input_hash, opts.now);
        match ledger.unit_of_work(|uow| uow.upsert_promotion_audit(&row)) {
            Ok(()) => run.report.pass(),
            Err(e) => {
                tracing::warn!(hypothesis_id = %h.id, error = %e, "exploration write rolled back");
                run.report.fail(&h.id, e.to_string());
            }
        }
    }

    tracing::info!(
        hypotheses = hypotheses.len(),
        selected = run.selected.len(),
        dry_run = opts.dry_run,
        "forced exploration run finished"
    );

    heartbeat::beat(ledger, JOB_NAME, &opts);
    Ok(run)
}
