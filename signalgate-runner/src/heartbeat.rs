//! Liveness: one row per non-dry job run.

use crate::report::RunOptions;
use crate::store::Ledger;

/// Record that `job` ran. Failures are logged and never affect the job result.
pub fn beat(ledger: &mut Ledger, job: &str, opts: &RunOptions) {
    if opts.dry_run {
        return;
    }
    if let Err(e) = ledger.unit_of_work(|uow| uow.record_heartbeat(job, opts.now)) {
        tracing::warn!(job, error = %e, "heartbeat not recorded");
    }
}
