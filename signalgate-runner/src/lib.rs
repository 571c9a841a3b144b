//! SignalGate Runner — batch jobs over the SQLite ledger.
//!
//! This crate builds on `signalgate-core` to provide:
//! - The ledger (schema, reads, scoped unit-of-work writes)
//! - Percentile scoring job with hard-stop audit
//! - Shadow gatekeeper job with the rolling shadow ledger
//! - Promotion gate job (default / forced / check) with fail-closed eligibility
//! - Forced-exploration pass
//! - CSV / JSONL ingestion, batch reports and heartbeats

pub mod exploration;
pub mod gate_job;
pub mod heartbeat;
pub mod ingest;
pub mod report;
pub mod scoring_job;
pub mod shadow_job;
pub mod store;

pub use exploration::{run_exploration, ExplorationRun};
pub use gate_job::{run_gate, GateRun, GateTarget};
pub use ingest::{ingest_hypotheses, ingest_outcomes, ingest_signals, IngestError};
pub use report::{BatchReport, RunOptions, UnitFailure};
pub use scoring_job::{run_scoring, ScoringRun};
pub use shadow_job::run_shadow;
pub use store::{
    EligibilityRow, HardStopRow, Ledger, PromotionAuditRow, ScoreAuditRow, ShadowRow, StoreError, UnitOfWork,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn reports_are_send_sync() {
        assert_send::<BatchReport>();
        assert_sync::<BatchReport>();
        assert_send::<ScoringRun>();
        assert_sync::<ScoringRun>();
        assert_send::<GateRun>();
        assert_sync::<GateRun>();
    }

    #[test]
    fn audit_rows_are_send_sync() {
        assert_send::<PromotionAuditRow>();
        assert_sync::<PromotionAuditRow>();
        assert_send::<EligibilityRow>();
        assert_sync::<EligibilityRow>();
    }

    #[test]
    fn ledger_is_send() {
        assert_send::<Ledger>();
    }
}
