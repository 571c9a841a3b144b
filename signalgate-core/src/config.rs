//! Evidence pipeline configuration.
//!
//! One immutable `EvidenceConfig` carries every weight, threshold and lookup
//! table used by the scorer, the shadow gatekeeper and the promotion gate. It
//! is built once (defaults or TOML) and passed into each component at
//! construction. Omitted TOML sections and fields fall back to defaults.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::hashing::{content_hash, ContentHash};
use crate::shadow::text::CueList;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub scorer: ScorerConfig,
    pub shadow: ShadowConfig,
    pub gate: GateConfig,
}

impl EvidenceConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scorer.validate()?;
        self.shadow.validate()?;
        self.gate.validate()
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {value}")))
    }
}

/// Map keys rewritten by `normalize`; two keys that collide after rewriting are an error.
fn normalized_keys<'de, D, V>(deserializer: D, normalize: fn(&str) -> String) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = BTreeMap::<String, V>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        let normalized = normalize(key.trim());
        if out.insert(normalized.clone(), value).is_some() {
            return Err(serde::de::Error::custom(format!("duplicate key '{normalized}' (keys are case-insensitive)")));
        }
    }
    Ok(out)
}

fn lowercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    normalized_keys(deserializer, str::to_ascii_lowercase)
}

fn uppercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, LiquidityTier>, D::Error>
where
    D: Deserializer<'de>,
{
    normalized_keys(deserializer, str::to_ascii_uppercase)
}

fn check_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be >= 0, got {value}")))
    }
}

// ─── Scorer ──────────────────────────────────────────────────────────

/// Criticality weight of each boolean factor flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorCriticality {
    pub price: f64,
    pub volume: f64,
    pub temporal: f64,
    pub regime: f64,
    pub testable: f64,
    pub catalyst: f64,
}

impl Default for FactorCriticality {
    fn default() -> Self {
        Self {
            price: 1.0,
            volume: 1.0,
            temporal: 1.0,
            regime: 0.8,
            testable: 0.7,
            catalyst: 0.5,
        }
    }
}

impl FactorCriticality {
    pub fn total(&self) -> f64 {
        self.price + self.volume + self.temporal + self.regime + self.testable + self.catalyst
    }
}

/// PercentileQualityScorer weights and tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Factor count that maps to a full base score.
    pub max_factor_count: f64,
    pub base_weight: f64,
    pub sitc_weight: f64,
    pub factor_weight: f64,
    pub category_weight: f64,
    pub recency_weight: f64,
    pub factor_criticality: FactorCriticality,
    /// Keys are lowercased on load; lookups lowercase the signal's category.
    #[serde(deserialize_with = "lowercase_keys")]
    pub category_strength: BTreeMap<String, f64>,
    pub unknown_category_strength: f64,
    /// Quantile cut points for tiers C, B, A, S (five edges).
    pub tier_cut_points: Vec<f64>,
    /// Hard-stop threshold on the non-dominant regime share, in percent.
    pub min_non_dominant_pct: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        let category_strength = [
            ("momentum", 0.80),
            ("mean_reversion", 0.70),
            ("volatility", 0.75),
            ("flow", 0.85),
            ("funding", 0.70),
            ("liquidation", 0.65),
            ("macro", 0.60),
            ("event", 0.65),
            ("sentiment", 0.50),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            max_factor_count: 7.0,
            base_weight: 0.60,
            sitc_weight: 0.15,
            factor_weight: 0.10,
            category_weight: 0.10,
            recency_weight: 0.05,
            factor_criticality: FactorCriticality::default(),
            category_strength,
            unknown_category_strength: 0.40,
            tier_cut_points: vec![0.0, 0.78, 0.88, 0.95, 1.0],
            min_non_dominant_pct: 15.0,
        }
    }
}

impl ScorerConfig {
    /// Hash of every weight constant; changes whenever the formula changes.
    pub fn formula_hash(&self) -> ContentHash {
        content_hash(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_factor_count > 0.0) {
            return Err(ConfigError::Invalid("scorer.max_factor_count must be > 0".into()));
        }
        for (name, w) in [
            ("scorer.base_weight", self.base_weight),
            ("scorer.sitc_weight", self.sitc_weight),
            ("scorer.factor_weight", self.factor_weight),
            ("scorer.category_weight", self.category_weight),
            ("scorer.recency_weight", self.recency_weight),
            ("scorer.unknown_category_strength", self.unknown_category_strength),
        ] {
            check_non_negative(name, w)?;
        }
        let fc = &self.factor_criticality;
        for w in [fc.price, fc.volume, fc.temporal, fc.regime, fc.testable, fc.catalyst] {
            check_non_negative("scorer.factor_criticality", w)?;
        }
        if fc.total() <= 0.0 {
            return Err(ConfigError::Invalid("scorer.factor_criticality sums to zero".into()));
        }
        for (cat, s) in &self.category_strength {
            check_non_negative(&format!("scorer.category_strength.{cat}"), *s)?;
        }

        let cuts = &self.tier_cut_points;
        if cuts.len() != 5 {
            return Err(ConfigError::Invalid(format!(
                "scorer.tier_cut_points needs 5 edges, got {}",
                cuts.len()
            )));
        }
        if cuts.windows(2).any(|w| w[0] > w[1]) || cuts[0] != 0.0 || cuts[4] != 1.0 {
            return Err(ConfigError::Invalid(
                "scorer.tier_cut_points must ascend from 0.0 to 1.0".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_non_dominant_pct) {
            return Err(ConfigError::Invalid(
                "scorer.min_non_dominant_pct must be in [0, 100]".into(),
            ));
        }
        Ok(())
    }
}

// ─── Shadow gatekeeper ───────────────────────────────────────────────

/// Liquidity class of a target asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    Liquid,
    Medium,
    Unknown,
    Illiquid,
}

/// Weights, thresholds and text cues of the three shadow phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    // ── Phase A ──
    pub semantic_weight: f64,
    pub logical_weight: f64,
    pub adversarial_weight: f64,
    pub phase_a_pass: f64,

    // ── Phase B ──
    pub unfiltered_regime_prior: f64,
    pub regime_match_base: f64,
    pub regime_match_confidence_weight: f64,
    pub regime_mismatch_scale: f64,
    pub regime_prior_weight: f64,
    pub significance_weight: f64,
    pub penalty_per_log2: f64,
    pub penalty_cap: f64,
    pub shadow_ledger_days: i64,
    pub phase_b_pass: f64,

    // ── Phase C ──
    /// Keys are uppercased on load; lookups uppercase the target asset.
    #[serde(deserialize_with = "uppercase_keys")]
    pub asset_liquidity: BTreeMap<String, LiquidityTier>,
    pub liquid_score: f64,
    pub medium_score: f64,
    pub unknown_score: f64,
    pub illiquid_score: f64,
    pub liquidity_weight: f64,
    pub latency_weight: f64,
    pub slippage_weight: f64,
    /// Assumed round-trip slippage, in percent.
    pub assumed_slippage_pct: f64,
    /// Take-profit thresholds below this (percent) are penalized.
    pub min_take_profit_pct: f64,
    pub phase_c_pass: f64,

    // ── Final ──
    pub final_weight_a: f64,
    pub final_weight_b: f64,
    pub final_weight_c: f64,
    pub phase_a_fail_cap: f64,
    pub accept_threshold: f64,
    pub log_threshold: f64,

    // ── Text cues ──
    pub domain_keywords: CueList,
    pub causal_cues: CueList,
    pub overconfident_terms: CueList,
    pub time_bound_cues: CueList,
    pub comparison_cues: CueList,
    pub instant_cues: CueList,
    pub session_cues: CueList,
}

fn words(list: &[&str]) -> CueList {
    CueList::new(list)
}

impl Default for ShadowConfig {
    fn default() -> Self {
        let mut asset_liquidity = BTreeMap::new();
        for a in ["BTC", "ETH", "SPY", "QQQ", "ES", "NQ", "EURUSD"] {
            asset_liquidity.insert(a.to_string(), LiquidityTier::Liquid);
        }
        for a in ["SOL", "XRP", "IWM", "GLD", "TLT", "AAPL", "MSFT", "NVDA"] {
            asset_liquidity.insert(a.to_string(), LiquidityTier::Medium);
        }
        for a in ["PEPE", "WIF", "BONK"] {
            asset_liquidity.insert(a.to_string(), LiquidityTier::Illiquid);
        }

        Self {
            semantic_weight: 0.35,
            logical_weight: 0.35,
            adversarial_weight: 0.30,
            phase_a_pass: 0.70,

            unfiltered_regime_prior: 0.70,
            regime_match_base: 0.80,
            regime_match_confidence_weight: 0.20,
            regime_mismatch_scale: 0.50,
            regime_prior_weight: 0.45,
            significance_weight: 0.55,
            penalty_per_log2: 0.02,
            penalty_cap: 0.15,
            shadow_ledger_days: 30,
            phase_b_pass: 0.60,

            asset_liquidity,
            liquid_score: 0.95,
            medium_score: 0.85,
            unknown_score: 0.70,
            illiquid_score: 0.60,
            liquidity_weight: 0.35,
            latency_weight: 0.30,
            slippage_weight: 0.35,
            assumed_slippage_pct: 0.10,
            min_take_profit_pct: 0.5,
            phase_c_pass: 0.65,

            final_weight_a: 0.30,
            final_weight_b: 0.40,
            final_weight_c: 0.30,
            phase_a_fail_cap: 0.8,
            accept_threshold: 0.85,
            log_threshold: 0.70,

            domain_keywords: words(&[
                "price", "volume", "return", "volatility", "spread", "momentum", "regime",
                "liquidity", "funding", "yield", "trend", "breakout", "drawdown", "basis",
                "open interest", "order flow",
            ]),
            causal_cues: words(&[
                "because", "due to", "leads to", "causes", "drives", "therefore",
                "as a result", "which means", "since",
            ]),
            overconfident_terms: words(&[
                "always", "never", "guaranteed", "100%", "certain", "cannot fail", "risk-free",
            ]),
            time_bound_cues: words(&[
                "minute", "hour", "day", "week", "month", "session", "within", "after", "before",
            ]),
            comparison_cues: words(&[
                "<", ">", "above", "below", "exceeds", "greater than", "less than", "crosses",
                "outperforms", "underperforms",
            ]),
            instant_cues: words(&[
                "instant", "immediately", "millisecond", "sub-second", "tick-by-tick",
                "front-run", "same tick",
            ]),
            session_cues: words(&[
                "hours", "session", "daily", "overnight", "days", "week", "multi-hour",
            ]),
        }
    }
}

impl ShadowConfig {
    pub fn liquidity_tier(&self, asset: &str) -> LiquidityTier {
        self.asset_liquidity
            .get(&asset.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(LiquidityTier::Unknown)
    }

    pub fn liquidity_score(&self, tier: LiquidityTier) -> f64 {
        match tier {
            LiquidityTier::Liquid => self.liquid_score,
            LiquidityTier::Medium => self.medium_score,
            LiquidityTier::Unknown => self.unknown_score,
            LiquidityTier::Illiquid => self.illiquid_score,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("shadow.phase_a_pass", self.phase_a_pass),
            ("shadow.phase_b_pass", self.phase_b_pass),
            ("shadow.phase_c_pass", self.phase_c_pass),
            ("shadow.accept_threshold", self.accept_threshold),
            ("shadow.log_threshold", self.log_threshold),
            ("shadow.phase_a_fail_cap", self.phase_a_fail_cap),
            ("shadow.unfiltered_regime_prior", self.unfiltered_regime_prior),
            ("shadow.liquid_score", self.liquid_score),
            ("shadow.medium_score", self.medium_score),
            ("shadow.unknown_score", self.unknown_score),
            ("shadow.illiquid_score", self.illiquid_score),
        ] {
            check_unit(name, v)?;
        }
        for (name, v) in [
            ("shadow.semantic_weight", self.semantic_weight),
            ("shadow.logical_weight", self.logical_weight),
            ("shadow.adversarial_weight", self.adversarial_weight),
            ("shadow.regime_prior_weight", self.regime_prior_weight),
            ("shadow.significance_weight", self.significance_weight),
            ("shadow.penalty_per_log2", self.penalty_per_log2),
            ("shadow.penalty_cap", self.penalty_cap),
            ("shadow.liquidity_weight", self.liquidity_weight),
            ("shadow.latency_weight", self.latency_weight),
            ("shadow.slippage_weight", self.slippage_weight),
            ("shadow.final_weight_a", self.final_weight_a),
            ("shadow.final_weight_b", self.final_weight_b),
            ("shadow.final_weight_c", self.final_weight_c),
            ("shadow.min_take_profit_pct", self.min_take_profit_pct),
        ] {
            check_non_negative(name, v)?;
        }
        if !(self.assumed_slippage_pct > 0.0) {
            return Err(ConfigError::Invalid("shadow.assumed_slippage_pct must be > 0".into()));
        }
        if self.shadow_ledger_days <= 0 {
            return Err(ConfigError::Invalid("shadow.shadow_ledger_days must be > 0".into()));
        }
        for (name, cues) in [
            ("shadow.domain_keywords", &self.domain_keywords),
            ("shadow.causal_cues", &self.causal_cues),
            ("shadow.overconfident_terms", &self.overconfident_terms),
            ("shadow.time_bound_cues", &self.time_bound_cues),
            ("shadow.comparison_cues", &self.comparison_cues),
            ("shadow.instant_cues", &self.instant_cues),
            ("shadow.session_cues", &self.session_cues),
        ] {
            cues.compile()
                .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        }
        if self.log_threshold > self.accept_threshold {
            return Err(ConfigError::Invalid(
                "shadow.log_threshold must not exceed shadow.accept_threshold".into(),
            ));
        }
        Ok(())
    }
}

// ─── Promotion gate ──────────────────────────────────────────────────

/// Thresholds of the overfitting-corrected promotion gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_deflated_sharpe: f64,
    pub max_pbo: f64,
    pub max_family_risk: f64,
    /// Upper bound on PBO folds.
    pub pbo_max_folds: usize,
    /// Fold win-rate gap counted as a degradation.
    pub pbo_degradation_gap: f64,
    /// Below this many outcomes PBO is forced to 1.0.
    pub pbo_min_outcomes: usize,
    /// Per-trial confidence for the family-wise term `1 - confidence^n_trials`.
    pub family_confidence: f64,
    /// Parameter count that maps to a degrees-of-freedom risk of 1.0.
    pub parameter_budget: f64,
    /// Sample-size precondition when a hypothesis declares none.
    pub default_min_sample_size: u32,
    /// Birth-score quantile at or above which forced exploration applies.
    pub exploration_quantile: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_deflated_sharpe: 1.0,
            max_pbo: 0.50,
            max_family_risk: 0.30,
            pbo_max_folds: 5,
            pbo_degradation_gap: 0.15,
            pbo_min_outcomes: 4,
            family_confidence: 0.95,
            parameter_budget: 20.0,
            default_min_sample_size: 30,
            exploration_quantile: 0.95,
        }
    }
}

impl GateConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_unit("gate.max_pbo", self.max_pbo)?;
        check_unit("gate.max_family_risk", self.max_family_risk)?;
        check_unit("gate.pbo_degradation_gap", self.pbo_degradation_gap)?;
        check_unit("gate.family_confidence", self.family_confidence)?;
        check_unit("gate.exploration_quantile", self.exploration_quantile)?;
        if self.pbo_max_folds < 2 {
            return Err(ConfigError::Invalid("gate.pbo_max_folds must be >= 2".into()));
        }
        if !(self.parameter_budget > 0.0) {
            return Err(ConfigError::Invalid("gate.parameter_budget must be > 0".into()));
        }
        if self.default_min_sample_size == 0 {
            return Err(ConfigError::Invalid(
                "gate.default_min_sample_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}
