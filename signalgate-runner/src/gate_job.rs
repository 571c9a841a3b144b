//! Promotion gate job.
//!
//! Default mode evaluates every RUNNING experiment whose outcome count meets
//! its hypothesis' sample-size precondition. `Force` evaluates one experiment
//! regardless of status or sample size.
//!
//! Each experiment is one unit of work: promotion audit upsert, hypothesis
//! metric update, experiment status and (on PASS only) the fail-closed
//! eligibility record.

use serde::Serialize;

use signalgate_core::config::GateConfig;
use signalgate_core::domain::{EligibilityRecord, Experiment, ExperimentStatus, FalsificationRule, Outcome};
use signalgate_core::gate::{GateEvaluation, OverfittingPromotionGate, GATE_NAME};
use signalgate_core::hashing::{content_hash, ContentHash};

use crate::heartbeat;
use crate::report::{BatchReport, RunOptions};
use crate::store::{Ledger, PromotionAuditRow, StoreError};

pub const JOB_NAME: &str = "promotion_gate";

/// Which experiments a gate run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTarget<'a> {
    /// RUNNING experiments that met their sample-size precondition.
    AllReady,
    /// One experiment, bypassing status and sample size.
    Force(&'a str),
}

/// Report plus the evaluations behind it.
#[derive(Debug, Clone, Serialize)]
pub struct GateRun {
    pub report: BatchReport,
    pub evaluations: Vec<GateEvaluation>,
}

/// Everything a gate verdict depends on. Unchanged inputs give an unchanged hash.
#[derive(Debug, Serialize)]
struct GateInput<'a> {
    experiment_id: &'a str,
    outcomes: &'a [Outcome],
    n_trials: u32,
    parameter_count: u32,
    rule: Option<&'a FalsificationRule>,
    config: &'a GateConfig,
}

pub fn run_gate(
    ledger: &mut Ledger,
    gate: &OverfittingPromotionGate,
    target: GateTarget<'_>,
    opts: RunOptions,
) -> Result<GateRun, StoreError> {
    let experiments: Vec<Experiment> = match target {
        GateTarget::AllReady => ledger
            .experiments()?
            .into_iter()
            .filter(|e| e.status == ExperimentStatus::Running)
            .collect(),
        GateTarget::Force(id) => {
            let exp = ledger
                .experiment(id)?
                .ok_or_else(|| StoreError::NotFound(format!("experiment {id}")))?;
            vec![exp]
        }
    };
    let forced = matches!(target, GateTarget::Force(_));

    let mut run = GateRun {
        report: BatchReport::new(JOB_NAME, opts.dry_run),
        evaluations: Vec::new(),
    };

    for exp in &experiments {
        match evaluate_experiment(ledger, gate, exp, forced, &opts) {
            Ok(Some(eval)) => {
                match eval.failure_reason() {
                    None => run.report.pass(),
                    Some(reason) => run.report.fail(&exp.id, reason),
                }
                run.evaluations.push(eval);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(experiment_id = %exp.id, error = %e, "gate unit rolled back");
                run.report.fail(&exp.id, e.to_string());
            }
        }
    }

    tracing::info!(
        candidates = experiments.len(),
        passed = run.report.passed,
        failed = run.report.failed,
        dry_run = opts.dry_run,
        "promotion gate run finished"
    );

    heartbeat::beat(ledger, JOB_NAME, &opts);
    Ok(run)
}

/// Evaluate and persist one experiment. `None` when it is not ready yet.
fn evaluate_experiment(
    ledger: &mut Ledger,
    gate: &OverfittingPromotionGate,
    exp: &Experiment,
    forced: bool,
    opts: &RunOptions,
) -> Result<Option<GateEvaluation>, StoreError> {
    let h = ledger
        .hypothesis(&exp.hypothesis_id)?
        .ok_or_else(|| StoreError::NotFound(format!("hypothesis {}", exp.hypothesis_id)))?;

    let outcomes = ledger.outcomes(&exp.id)?;
    if !forced && !gate.is_ready(&h, outcomes.len()) {
        tracing::debug!(
            experiment_id = %exp.id,
            outcomes = outcomes.len(),
            required = gate.min_sample_size(&h),
            "not enough outcomes yet"
        );
        return Ok(None);
    }

    let prior_experiments = ledger.prior_experiment_count(&h.id, &exp.id)?;
    let eval = gate.evaluate(&h, &exp.id, &outcomes, prior_experiments);
    let input_hash = gate_input_hash(gate, &h.falsification.rule, h.parameter_count, exp, &outcomes, &eval);

    tracing::info!(
        hypothesis_id = %h.id,
        experiment_id = %exp.id,
        verdict = %eval.verdict,
        deflated_sharpe = eval.metrics.deflated_sharpe,
        pbo = eval.metrics.pbo,
        family_risk = eval.metrics.family_risk,
        win_rate = eval.metrics.win_rate,
        "gate evaluated"
    );

    if opts.dry_run {
        return Ok(Some(eval));
    }

    let row = PromotionAuditRow::from_evaluation(&eval, &input_hash, opts.now)?;
    ledger.unit_of_work(|uow| {
        uow.upsert_promotion_audit(&row)?;
        uow.record_gate_result(&eval)?;
        uow.set_experiment_status(&exp.id, ExperimentStatus::Evaluated)?;
        if eval.passed() {
            let record = EligibilityRecord::shadow_only(&h.id, &exp.id, GATE_NAME, opts.now);
            uow.upsert_eligibility(&record)?;
        }
        Ok(())
    })?;

    if eval.passed() {
        tracing::info!(
            hypothesis_id = %h.id,
            experiment_id = %exp.id,
            "shadow-only eligibility recorded; live capital and leverage blocked"
        );
    }
    Ok(Some(eval))
}

fn gate_input_hash(
    gate: &OverfittingPromotionGate,
    rule: &Option<FalsificationRule>,
    parameter_count: u32,
    exp: &Experiment,
    outcomes: &[Outcome],
    eval: &GateEvaluation,
) -> ContentHash {
    content_hash(&GateInput {
        experiment_id: &exp.id,
        outcomes,
        n_trials: eval.metrics.n_trials,
        parameter_count,
        rule: rule.as_ref(),
        config: gate.config(),
    })
}
