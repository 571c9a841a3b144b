//! SignalGate Core — evidence quality scoring and promotion gating.
//!
//! This crate is pure, deterministic computation with no I/O:
//! - Domain types (signals, hypotheses, experiments, outcomes, eligibility)
//! - Immutable pipeline configuration loaded from TOML
//! - Content hashing for input and formula reproducibility
//! - Percentile quality scorer with a regime-diversity hard stop
//! - Three-phase shadow gatekeeper (non-binding)
//! - Deflated Sharpe, PBO and family-wise risk; the promotion gate decision

pub mod config;
pub mod domain;
pub mod gate;
pub mod hashing;
pub mod overfitting;
pub mod scoring;
pub mod shadow;
pub mod stats;

pub use config::{ConfigError, EvidenceConfig, GateConfig, LiquidityTier, ScorerConfig, ShadowConfig};
pub use gate::{
    select_exploration_candidates, ExplorationSelection, GateEvaluation, GateFailure, GateVerdict, OverfittingPromotionGate,
    EXPLORATION_GATE_NAME, GATE_NAME,
};
pub use hashing::{content_hash, ContentHash};
pub use overfitting::{
    compute_deflated_sharpe, compute_pbo_estimate, family_inflation_risk, sharpe_ratio, OverfittingMetrics,
};
pub use scoring::{
    DiversityCheck, HardStop, PercentileQualityScorer, RegimeDistribution, RowError, ScoreBatchResult,
    ScoredBatch, SignalScore,
};
pub use shadow::{
    text::CueList, ConfidenceLabel, FinalVerdict, PhaseScore, ShadowContext, ShadowDecision, ShadowEvaluation,
    ShadowGatekeeper,
};
