//! Audit and eligibility rows as stored in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use signalgate_core::domain::{ExecutionMode, Tier};
use signalgate_core::gate::{GateEvaluation, GateVerdict, EXPLORATION_GATE_NAME, GATE_NAME};
use signalgate_core::hashing::ContentHash;
use signalgate_core::shadow::{ConfidenceLabel, ShadowDecision};

/// One per-signal scoring audit row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreAuditRow {
    pub signal_id: String,
    pub input_hash: String,
    pub formula_hash: String,
    pub quality_score: f64,
    pub tier: Tier,
    pub sitc_pct: f64,
    pub factor_pct: f64,
    pub category_pct: f64,
    pub recency_pct: f64,
    pub scored_at: DateTime<Utc>,
}

/// One hard-stop event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardStopRow {
    pub occurred_at: DateTime<Utc>,
    pub distribution: BTreeMap<String, usize>,
    pub dominant_regime: Option<String>,
    pub non_dominant_pct: f64,
    pub threshold_pct: f64,
    pub blocked_count: usize,
    pub formula_hash: String,
}

/// Stored shadow evaluation summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowRow {
    pub content_hash: String,
    pub hypothesis_id: String,
    pub target_asset: String,
    pub phase_a_score: f64,
    pub phase_b_score: f64,
    pub phase_c_score: f64,
    pub final_score: f64,
    pub phase_a_capped: bool,
    pub decision: ShadowDecision,
    pub confidence: ConfidenceLabel,
    pub evaluated_at: DateTime<Utc>,
}

/// Promotion audit row, keyed by `(hypothesis_id, gate_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionAuditRow {
    pub hypothesis_id: String,
    pub gate_name: String,
    pub experiment_id: Option<String>,
    pub verdict: GateVerdict,
    pub falsified: bool,
    pub deflated_sharpe: Option<f64>,
    pub pbo: Option<f64>,
    pub family_risk: Option<f64>,
    pub win_rate: Option<f64>,
    /// Full metric set as JSON.
    pub metrics: Option<String>,
    pub failure_reason: Option<String>,
    pub input_hash: String,
    pub evaluated_at: DateTime<Utc>,
}

impl PromotionAuditRow {
    pub fn from_evaluation(
        eval: &GateEvaluation,
        input_hash: &ContentHash,
        evaluated_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            hypothesis_id: eval.hypothesis_id.clone(),
            gate_name: GATE_NAME.to_string(),
            experiment_id: Some(eval.experiment_id.clone()),
            verdict: eval.verdict,
            falsified: eval.falsified,
            deflated_sharpe: Some(eval.metrics.deflated_sharpe),
            pbo: Some(eval.metrics.pbo),
            family_risk: Some(eval.metrics.family_risk),
            win_rate: Some(eval.metrics.win_rate),
            metrics: Some(serde_json::to_string(&eval.metrics)?),
            failure_reason: eval.failure_reason(),
            input_hash: input_hash.to_string(),
            evaluated_at,
        })
    }

    /// Forced-exploration row: no gate metrics, only the birth score and the
    /// cutoff it cleared.
    pub fn exploration(
        hypothesis_id: &str,
        birth_score: f64,
        cutoff: f64,
        input_hash: &ContentHash,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let details = serde_json::json!({ "birth_score": birth_score, "cutoff": cutoff });
        Self {
            hypothesis_id: hypothesis_id.to_string(),
            gate_name: EXPLORATION_GATE_NAME.to_string(),
            experiment_id: None,
            verdict: GateVerdict::ExplorationPass,
            falsified: false,
            deflated_sharpe: None,
            pbo: None,
            family_risk: None,
            win_rate: None,
            metrics: Some(details.to_string()),
            failure_reason: None,
            input_hash: input_hash.to_string(),
            evaluated_at,
        }
    }
}

/// Eligibility as currently stored; governance may have changed the flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityRow {
    pub hypothesis_id: String,
    pub experiment_id: String,
    pub granted_by: String,
    pub is_eligible: bool,
    pub execution_mode: ExecutionMode,
    pub live_capital_blocked: bool,
    pub leverage_blocked: bool,
    pub created_at: DateTime<Utc>,
}
