//! Scoped writes. Every method runs inside the unit's transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};

use signalgate_core::domain::{EligibilityRecord, Experiment, ExperimentStatus, Hypothesis, Outcome, Signal, Tier};
use signalgate_core::gate::GateEvaluation;
use signalgate_core::hashing::ContentHash;
use signalgate_core::scoring::{HardStop, SignalScore};
use signalgate_core::shadow::ShadowEvaluation;

use super::{PromotionAuditRow, StoreError};

/// One transaction. Dropped without `commit` means rolled back.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub(super) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub(super) fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }

    // ─── Signals ─────────────────────────────────────────────────────

    /// Insert or refresh a signal's raw fields. The derived score and tier are kept.
    pub fn upsert_signal(&self, s: &Signal) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO signals (id, confluence_factor_count, sitc_nodes_completed, sitc_nodes_total,
                category, created_at, factor_price, factor_volume, factor_regime, factor_temporal,
                factor_catalyst, factor_testable, regime, lifecycle)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                confluence_factor_count = excluded.confluence_factor_count,
                sitc_nodes_completed = excluded.sitc_nodes_completed,
                sitc_nodes_total = excluded.sitc_nodes_total,
                category = excluded.category,
                created_at = excluded.created_at,
                factor_price = excluded.factor_price,
                factor_volume = excluded.factor_volume,
                factor_regime = excluded.factor_regime,
                factor_temporal = excluded.factor_temporal,
                factor_catalyst = excluded.factor_catalyst,
                factor_testable = excluded.factor_testable,
                regime = excluded.regime,
                lifecycle = excluded.lifecycle",
            params![
                s.id,
                s.confluence_factor_count,
                s.sitc_nodes_completed,
                s.sitc_nodes_total,
                s.category,
                s.created_at,
                s.factors.price,
                s.factors.volume,
                s.factors.regime,
                s.factors.temporal,
                s.factors.catalyst,
                s.factors.testable,
                s.regime,
                s.lifecycle.as_str(),
            ],
        )?;
        Ok(())
    }

    /// The scorer's only mutation of a signal.
    pub fn set_signal_score(&self, signal_id: &str, quality_score: f64, tier: Tier) -> Result<(), StoreError> {
        let n = self.tx.execute(
            "UPDATE signals SET quality_score = ?2, tier = ?3 WHERE id = ?1",
            params![signal_id, quality_score, tier.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("signal {signal_id}")));
        }
        Ok(())
    }

    /// Idempotent per-row audit keyed by `(signal_id, input_hash, formula_hash)`.
    /// `scored_at` only moves when the stored result changes.
    pub fn upsert_score_audit(&self, score: &SignalScore, scored_at: DateTime<Utc>) -> Result<(), StoreError> {
        let sub_metrics = serde_json::to_string(&score.metrics)?;
        self.tx.execute(
            "INSERT INTO signal_score_audit (signal_id, input_hash, formula_hash, quality_score, tier,
                sitc_pct, factor_pct, category_pct, recency_pct, sub_metrics, scored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(signal_id, input_hash, formula_hash) DO UPDATE SET
                scored_at = CASE
                    WHEN quality_score = excluded.quality_score AND tier = excluded.tier
                    THEN scored_at ELSE excluded.scored_at END,
                quality_score = excluded.quality_score,
                tier = excluded.tier,
                sitc_pct = excluded.sitc_pct,
                factor_pct = excluded.factor_pct,
                category_pct = excluded.category_pct,
                recency_pct = excluded.recency_pct,
                sub_metrics = excluded.sub_metrics",
            params![
                score.signal_id,
                score.input_hash.as_str(),
                score.formula_hash.as_str(),
                score.quality_score,
                score.tier.as_str(),
                score.sitc_pct,
                score.factor_pct,
                score.category_pct,
                score.recency_pct,
                sub_metrics,
                scored_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_hard_stop(
        &self,
        stop: &HardStop,
        formula_hash: &ContentHash,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let distribution = serde_json::to_string(&stop.distribution.counts)?;
        let blocked = i64::try_from(stop.blocked_count)
            .map_err(|_| StoreError::Invalid(format!("blocked count {} out of range", stop.blocked_count)))?;
        self.tx.execute(
            "INSERT INTO scoring_hard_stops (occurred_at, distribution, dominant_regime,
                non_dominant_pct, threshold_pct, blocked_count, formula_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                occurred_at,
                distribution,
                stop.dominant_regime,
                stop.non_dominant_pct,
                stop.threshold_pct,
                blocked,
                formula_hash.as_str(),
            ],
        )?;
        Ok(())
    }

    // ─── Hypotheses / experiments / outcomes ─────────────────────────

    /// Insert or refresh a hypothesis' declared fields. Gate outputs are kept.
    pub fn upsert_hypothesis(&self, h: &Hypothesis) -> Result<(), StoreError> {
        let rule = h.falsification.rule.as_ref().map(serde_json::to_string).transpose()?;
        self.tx.execute(
            "INSERT INTO hypotheses (id, statement, rationale, target_asset, regime_filter,
                current_confidence, falsification_raw, falsification_rule, min_sample_size,
                take_profit_pct, trial_count, prior_hypotheses_count, parameter_count,
                birth_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                statement = excluded.statement,
                rationale = excluded.rationale,
                target_asset = excluded.target_asset,
                regime_filter = excluded.regime_filter,
                current_confidence = excluded.current_confidence,
                falsification_raw = excluded.falsification_raw,
                falsification_rule = excluded.falsification_rule,
                min_sample_size = excluded.min_sample_size,
                take_profit_pct = excluded.take_profit_pct,
                trial_count = excluded.trial_count,
                prior_hypotheses_count = excluded.prior_hypotheses_count,
                parameter_count = excluded.parameter_count,
                birth_score = excluded.birth_score",
            params![
                h.id,
                h.statement,
                h.rationale,
                h.target_asset,
                h.regime_filter,
                h.current_confidence,
                h.falsification.raw,
                rule,
                h.falsification.min_sample_size,
                h.take_profit_pct,
                h.trial_count,
                h.prior_hypotheses_count,
                h.parameter_count,
                h.birth_score,
                h.created_at,
            ],
        )?;
        Ok(())
    }

    /// Write the gate's metrics back onto the hypothesis.
    pub fn record_gate_result(&self, eval: &GateEvaluation) -> Result<(), StoreError> {
        let n = self.tx.execute(
            "UPDATE hypotheses SET tier1_result = ?2, deflated_sharpe_estimate = ?3,
                pbo_probability = ?4, family_inflation_risk = ?5
             WHERE id = ?1",
            params![
                eval.hypothesis_id,
                eval.verdict.as_str(),
                eval.metrics.deflated_sharpe,
                eval.metrics.pbo,
                eval.metrics.family_risk,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("hypothesis {}", eval.hypothesis_id)));
        }
        Ok(())
    }

    /// Insert an experiment unless it already exists.
    pub fn insert_experiment(&self, e: &Experiment) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT OR IGNORE INTO experiments (id, hypothesis_id, status, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![e.id, e.hypothesis_id, e.status.as_str(), e.started_at],
        )?;
        Ok(())
    }

    pub fn set_experiment_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE experiments SET status = ?2 WHERE id = ?1",
            params![experiment_id, status.as_str()],
        )?;
        Ok(())
    }

    /// Append an outcome. Returns false when the same `(experiment, opened_at)`
    /// is already recorded.
    pub fn insert_outcome(&self, o: &Outcome) -> Result<bool, StoreError> {
        let n = self.tx.execute(
            "INSERT OR IGNORE INTO outcomes (experiment_id, won, return_pct, opened_at, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![o.experiment_id, o.won, o.return_pct, o.opened_at, o.closed_at],
        )?;
        Ok(n > 0)
    }

    // ─── Shadow evaluations ──────────────────────────────────────────

    /// Upsert keyed by content hash; `evaluated_at` only moves when the verdict changes.
    pub fn upsert_shadow_evaluation(&self, eval: &ShadowEvaluation) -> Result<(), StoreError> {
        let breakdown = serde_json::to_string(&serde_json::json!({
            "phase_a": eval.phase_a,
            "phase_b": eval.phase_b,
            "phase_c": eval.phase_c,
        }))?;
        self.tx.execute(
            "INSERT INTO shadow_evaluations (content_hash, hypothesis_id, target_asset, current_regime,
                phase_a_score, phase_b_score, phase_c_score, breakdown, final_score, phase_a_capped,
                decision, confidence, evaluated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(content_hash) DO UPDATE SET
                evaluated_at = CASE
                    WHEN final_score = excluded.final_score AND decision = excluded.decision
                    THEN evaluated_at ELSE excluded.evaluated_at END,
                hypothesis_id = excluded.hypothesis_id,
                target_asset = excluded.target_asset,
                current_regime = excluded.current_regime,
                phase_a_score = excluded.phase_a_score,
                phase_b_score = excluded.phase_b_score,
                phase_c_score = excluded.phase_c_score,
                breakdown = excluded.breakdown,
                final_score = excluded.final_score,
                phase_a_capped = excluded.phase_a_capped,
                decision = excluded.decision,
                confidence = excluded.confidence",
            params![
                eval.content_hash.as_str(),
                eval.hypothesis_id,
                eval.target_asset,
                eval.current_regime,
                eval.phase_a.score,
                eval.phase_b.score,
                eval.phase_c.score,
                breakdown,
                eval.verdict.score,
                eval.verdict.phase_a_capped,
                eval.verdict.decision.as_str(),
                eval.verdict.confidence.as_str(),
                eval.evaluated_at,
            ],
        )?;
        Ok(())
    }

    // ─── Promotion audit / eligibility ───────────────────────────────

    /// Upsert keyed by `(hypothesis_id, gate_name)`. An unchanged input hash
    /// keeps the original `evaluated_at`, so re-runs leave the row identical.
    pub fn upsert_promotion_audit(&self, row: &PromotionAuditRow) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO promotion_audit (hypothesis_id, gate_name, experiment_id, verdict, falsified,
                deflated_sharpe, pbo, family_risk, win_rate, metrics, failure_reason, input_hash,
                evaluated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(hypothesis_id, gate_name) DO UPDATE SET
                evaluated_at = CASE
                    WHEN input_hash = excluded.input_hash THEN evaluated_at
                    ELSE excluded.evaluated_at END,
                experiment_id = excluded.experiment_id,
                verdict = excluded.verdict,
                falsified = excluded.falsified,
                deflated_sharpe = excluded.deflated_sharpe,
                pbo = excluded.pbo,
                family_risk = excluded.family_risk,
                win_rate = excluded.win_rate,
                metrics = excluded.metrics,
                failure_reason = excluded.failure_reason,
                input_hash = excluded.input_hash",
            params![
                row.hypothesis_id,
                row.gate_name,
                row.experiment_id,
                row.verdict.as_str(),
                row.falsified,
                row.deflated_sharpe,
                row.pbo,
                row.family_risk,
                row.win_rate,
                row.metrics,
                row.failure_reason,
                row.input_hash,
                row.evaluated_at,
            ],
        )?;
        Ok(())
    }

    /// Record a fail-closed eligibility grant.
    ///
    /// An existing row only has its experiment reference refreshed; flags and
    /// `created_at` belong to governance once the row exists.
    pub fn upsert_eligibility(&self, record: &EligibilityRecord) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO eligibility (hypothesis_id, experiment_id, granted_by, is_eligible,
                execution_mode, live_capital_blocked, leverage_blocked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(hypothesis_id) DO UPDATE SET
                experiment_id = excluded.experiment_id",
            params![
                record.hypothesis_id(),
                record.experiment_id(),
                record.granted_by(),
                record.is_eligible(),
                record.execution_mode().as_str(),
                record.live_capital_blocked(),
                record.leverage_blocked(),
                record.created_at(),
            ],
        )?;
        Ok(())
    }

    pub fn record_heartbeat(&self, job: &str, ran_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO heartbeats (job, ran_at) VALUES (?1, ?2)",
            params![job, ran_at],
        )?;
        Ok(())
    }
}
