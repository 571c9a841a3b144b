//! Shadow gatekeeper — a parallel, non-binding three-phase evaluation.
//!
//! Phases run strictly A → B → C and always all three, so every breakdown is
//! recorded even when Phase A already failed. The result is research data for
//! calibrating the scorer; nothing on the execution path reads it.
//!
//! - **Phase A:** semantic coherence / logical consistency / adversarial probe.
//! - **Phase B:** regime prior and statistical significance, minus an
//!   overfitting penalty from the shadow ledger.
//! - **Phase C:** liquidity, latency assumptions, slippage feasibility.
//!
//! A Phase A failure caps the final score at `A * 0.8`; later phases cannot
//! rescue it.

pub mod phase_a;
pub mod phase_b;
pub mod phase_c;
pub mod text;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ShadowConfig;
use crate::domain::Hypothesis;
use crate::hashing::{content_hash, ContentHash};

// ─── Result types ────────────────────────────────────────────────────

/// Score of a single phase with its named components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseScore {
    pub score: f64,
    pub passed: bool,
    pub breakdown: BTreeMap<String, f64>,
}

impl PhaseScore {
    pub fn new(score: f64, pass_threshold: f64) -> Self {
        Self {
            score,
            passed: score >= pass_threshold,
            breakdown: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.breakdown.insert(name.to_string(), value);
        self
    }
}

/// What the gatekeeper would have done, had it been binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShadowDecision {
    WouldAccept,
    WouldLog,
    WouldReject,
}

impl ShadowDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowDecision::WouldAccept => "WOULD_ACCEPT",
            ShadowDecision::WouldLog => "WOULD_LOG",
            ShadowDecision::WouldReject => "WOULD_REJECT",
        }
    }
}

impl fmt::Display for ShadowDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadowDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WOULD_ACCEPT" => Ok(ShadowDecision::WouldAccept),
            "WOULD_LOG" => Ok(ShadowDecision::WouldLog),
            "WOULD_REJECT" => Ok(ShadowDecision::WouldReject),
            other => Err(format!("unknown shadow decision '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLabel::High => "HIGH",
            ConfidenceLabel::Medium => "MEDIUM",
            ConfidenceLabel::Low => "LOW",
        }
    }
}

impl FromStr for ConfidenceLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(ConfidenceLabel::High),
            "MEDIUM" => Ok(ConfidenceLabel::Medium),
            "LOW" => Ok(ConfidenceLabel::Low),
            other => Err(format!("unknown confidence label '{other}'")),
        }
    }
}

/// Final score and the decision it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub score: f64,
    pub phase_a_capped: bool,
    pub decision: ShadowDecision,
    pub confidence: ConfidenceLabel,
}

/// Caller-supplied context for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowContext {
    /// Regime label from the external classifier, if known.
    pub current_regime: Option<String>,
    /// WOULD_REJECT count for the same asset in the rolling shadow ledger.
    pub prior_rejections: u32,
    pub evaluated_at: DateTime<Utc>,
}

/// A complete shadow evaluation, persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowEvaluation {
    pub content_hash: ContentHash,
    pub hypothesis_id: String,
    pub target_asset: String,
    pub current_regime: Option<String>,
    pub phase_a: PhaseScore,
    pub phase_b: PhaseScore,
    pub phase_c: PhaseScore,
    pub verdict: FinalVerdict,
    pub evaluated_at: DateTime<Utc>,
}

// ─── Gatekeeper ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ShadowGatekeeper {
    config: ShadowConfig,
}

/// The text fields a shadow evaluation depends on.
#[derive(Debug, Serialize)]
struct EvaluatedText<'a> {
    statement: &'a str,
    rationale: &'a str,
    target_asset: &'a str,
    regime_filter: Option<&'a str>,
    falsification: &'a str,
    take_profit_pct: Option<f64>,
}

impl ShadowGatekeeper {
    pub fn new(config: ShadowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Identity of a hypothesis' evaluated text; unchanged text upserts.
    pub fn content_hash(h: &Hypothesis) -> ContentHash {
        content_hash(&EvaluatedText {
            statement: h.statement.trim(),
            rationale: h.rationale.trim(),
            target_asset: h.target_asset.trim(),
            regime_filter: h.regime_filter.as_deref(),
            falsification: h.falsification.raw.trim(),
            take_profit_pct: h.take_profit_pct,
        })
    }

    pub fn evaluate(&self, h: &Hypothesis, ctx: &ShadowContext) -> ShadowEvaluation {
        let cfg = &self.config;
        let phase_a = phase_a::evaluate(h, cfg);
        let phase_b = phase_b::evaluate(h, ctx.current_regime.as_deref(), ctx.prior_rejections, cfg);
        let phase_c = phase_c::evaluate(h, cfg);
        let verdict = self.combine(&phase_a, &phase_b, &phase_c);

        tracing::info!(
            hypothesis_id = %h.id,
            phase_a = phase_a.score,
            phase_b = phase_b.score,
            phase_c = phase_c.score,
            final_score = verdict.score,
            decision = %verdict.decision,
            "shadow evaluation"
        );

        ShadowEvaluation {
            content_hash: Self::content_hash(h),
            hypothesis_id: h.id.clone(),
            target_asset: h.target_asset.trim().to_ascii_uppercase(),
            current_regime: ctx.current_regime.clone(),
            phase_a,
            phase_b,
            phase_c,
            verdict,
            evaluated_at: ctx.evaluated_at,
        }
    }

    /// Final score from the three phases.
    pub fn combine(&self, a: &PhaseScore, b: &PhaseScore, c: &PhaseScore) -> FinalVerdict {
        let cfg = &self.config;
        let phase_a_capped = !a.passed;
        let score = if phase_a_capped {
            a.score * cfg.phase_a_fail_cap
        } else {
            cfg.final_weight_a * a.score + cfg.final_weight_b * b.score + cfg.final_weight_c * c.score
        };

        let (decision, confidence) = if score >= cfg.accept_threshold {
            (ShadowDecision::WouldAccept, ConfidenceLabel::High)
        } else if score >= cfg.log_threshold {
            (ShadowDecision::WouldLog, ConfidenceLabel::Medium)
        } else {
            (ShadowDecision::WouldReject, ConfidenceLabel::Low)
        };

        FinalVerdict {
            score,
            phase_a_capped,
            decision,
            confidence,
        }
    }
}
