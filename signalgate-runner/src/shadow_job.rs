//! Shadow evaluation job.
//!
//! Evaluates every hypothesis through the three phases and upserts the result
//! keyed by the hypothesis' content hash. Nothing here reads or writes gate,
//! eligibility or signal state; the shadow ledger is its only input besides
//! the hypothesis itself.

use chrono::Duration;

use signalgate_core::domain::Hypothesis;
use signalgate_core::shadow::{ShadowContext, ShadowDecision, ShadowEvaluation, ShadowGatekeeper};

use crate::heartbeat;
use crate::report::{BatchReport, RunOptions};
use crate::store::{Ledger, StoreError};

pub const JOB_NAME: &str = "shadow_gatekeeper";

/// Shadow-ledger N for `h`: prior WOULD_REJECT evaluations of the same asset
/// inside the rolling window ending at `opts.now`.
pub fn prior_rejections(
    ledger: &Ledger,
    gatekeeper: &ShadowGatekeeper,
    h: &Hypothesis,
    opts: &RunOptions,
) -> Result<u32, StoreError> {
    let since = opts.now - Duration::days(gatekeeper.config().shadow_ledger_days);
    let own_hash = ShadowGatekeeper::content_hash(h);
    ledger.shadow_rejections(&h.target_asset, since, opts.now, own_hash.as_str())
}

/// Evaluate one hypothesis against the current ledger.
pub fn evaluate_one(
    ledger: &Ledger,
    gatekeeper: &ShadowGatekeeper,
    h: &Hypothesis,
    current_regime: Option<&str>,
    opts: &RunOptions,
) -> Result<ShadowEvaluation, StoreError> {
    let ctx = ShadowContext {
        current_regime: current_regime.map(str::to_string),
        prior_rejections: prior_rejections(ledger, gatekeeper, h, opts)?,
        evaluated_at: opts.now,
    };
    Ok(gatekeeper.evaluate(h, &ctx))
}

/// Run the gatekeeper over every hypothesis in the ledger.
///
/// Hypotheses are processed in id order, so a rejection written earlier in
/// the run counts toward later hypotheses on the same asset.
pub fn run_shadow(
    ledger: &mut Ledger,
    gatekeeper: &ShadowGatekeeper,
    current_regime: Option<&str>,
    opts: RunOptions,
) -> Result<BatchReport, StoreError> {
    let hypotheses = ledger.hypotheses()?;
    let mut report = BatchReport::new(JOB_NAME, opts.dry_run);
    let (mut accepted, mut logged, mut rejected) = (0usize, 0usize, 0usize);

    for h in &hypotheses {
        let eval = match evaluate_one(ledger, gatekeeper, h, current_regime, &opts) {
            Ok(eval) => eval,
            Err(e) => {
                tracing::warn!(hypothesis_id = %h.id, error = %e, "shadow ledger lookup failed");
                report.fail(&h.id, e.to_string());
                continue;
            }
        };

        match eval.verdict.decision {
            ShadowDecision::WouldAccept => accepted += 1,
            ShadowDecision::WouldLog => logged += 1,
            ShadowDecision::WouldReject => rejected += 1,
        }

        if opts.dry_run {
            report.pass();
            continue;
        }
        match ledger.unit_of_work(|uow| uow.upsert_shadow_evaluation(&eval)) {
            Ok(()) => report.pass(),
            Err(e) => {
                tracing::warn!(hypothesis_id = %h.id, error = %e, "shadow write rolled back");
                report.fail(&h.id, e.to_string());
            }
        }
    }

    tracing::info!(
        evaluated = hypotheses.len(),
        would_accept = accepted,
        would_log = logged,
        would_reject = rejected,
        regime = current_regime.unwrap_or("unknown"),
        "shadow run finished"
    );

    heartbeat::beat(ledger, JOB_NAME, &opts);
    Ok(report)
}
