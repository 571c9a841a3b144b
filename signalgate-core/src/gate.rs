//! Overfitting promotion gate — the pure decision.
//!
//! An experiment is evaluated once it holds at least `min_sample_size`
//! outcomes. PASS requires all of:
//! - deflated Sharpe >= `min_deflated_sharpe`
//! - PBO <= `max_pbo`
//! - family-wise inflation risk <= `max_family_risk`
//! - the declared falsification rule does not trigger
//!
//! A triggered falsification rule yields FALSIFIED regardless of the other
//! metrics. Every violated condition is listed in the failure reason.
//!
//! Forced exploration is a separate, labeled override: hypotheses whose birth
//! score sits in the top quantile and that have never been audited get an
//! EXPLORATION_PASS row. It never produces eligibility.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::config::GateConfig;
use crate::domain::{FalsificationRule, Hypothesis, Outcome};
use crate::overfitting::OverfittingMetrics;
use crate::stats::quantile;

/// Gate name keying promotion audit rows.
pub const GATE_NAME: &str = "overfitting_gate";
/// Gate name of forced-exploration audit rows.
pub const EXPLORATION_GATE_NAME: &str = "forced_exploration";

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateVerdict {
    Pass,
    Fail,
    Falsified,
    ExplorationPass,
}

impl GateVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateVerdict::Pass => "PASS",
            GateVerdict::Fail => "FAIL",
            GateVerdict::Falsified => "FALSIFIED",
            GateVerdict::ExplorationPass => "EXPLORATION_PASS",
        }
    }
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(GateVerdict::Pass),
            "FAIL" => Ok(GateVerdict::Fail),
            "FALSIFIED" => Ok(GateVerdict::Falsified),
            "EXPLORATION_PASS" => Ok(GateVerdict::ExplorationPass),
            other => Err(format!("unknown gate verdict '{other}'")),
        }
    }
}

/// One violated gate condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateFailure {
    DeflatedSharpe { value: f64, threshold: f64 },
    Pbo { value: f64, threshold: f64 },
    FamilyRisk { value: f64, threshold: f64 },
    Falsified { rule: String, observed: f64 },
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::DeflatedSharpe { value, threshold } => {
                write!(f, "deflated_sharpe {value:.4} < {threshold:.4}")
            }
            GateFailure::Pbo { value, threshold } => write!(f, "pbo {value:.4} > {threshold:.4}"),
            GateFailure::FamilyRisk { value, threshold } => {
                write!(f, "family_risk {value:.4} > {threshold:.4}")
            }
            GateFailure::Falsified { rule, observed } => {
                write!(f, "falsified: {rule} (observed {observed:.4})")
            }
        }
    }
}

/// Full gate outcome for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub hypothesis_id: String,
    pub experiment_id: String,
    pub metrics: OverfittingMetrics,
    pub rule: Option<FalsificationRule>,
    pub falsified: bool,
    pub verdict: GateVerdict,
    pub failures: Vec<GateFailure>,
}

impl GateEvaluation {
    /// Every violated condition joined with `"; "`. None on PASS.
    pub fn failure_reason(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(
                self.failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == GateVerdict::Pass
    }
}

// ─── Gate ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OverfittingPromotionGate {
    config: GateConfig,
}

impl OverfittingPromotionGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Declared sample-size precondition, or the configured default.
    pub fn min_sample_size(&self, h: &Hypothesis) -> u32 {
        h.falsification
            .min_sample_size
            .filter(|&n| n > 0)
            .unwrap_or(self.config.default_min_sample_size)
    }

    pub fn is_ready(&self, h: &Hypothesis, n_outcomes: usize) -> bool {
        n_outcomes >= self.min_sample_size(h) as usize
    }

    /// `max(trial_count, prior_hypotheses_count, prior_experiments, 1)`.
    pub fn n_trials(h: &Hypothesis, prior_experiments: u32) -> u32 {
        h.trial_count
            .max(h.prior_hypotheses_count)
            .max(prior_experiments)
            .max(1)
    }

    /// Compute metrics for an experiment's outcomes and decide.
    pub fn evaluate(
        &self,
        h: &Hypothesis,
        experiment_id: &str,
        outcomes: &[Outcome],
        prior_experiments: u32,
    ) -> GateEvaluation {
        let n_trials = Self::n_trials(h, prior_experiments);
        let metrics = OverfittingMetrics::compute(outcomes, n_trials, h.parameter_count, &self.config);
        self.decide(h, experiment_id, metrics)
    }

    /// Apply thresholds and the falsification rule to precomputed metrics.
    pub fn decide(&self, h: &Hypothesis, experiment_id: &str, metrics: OverfittingMetrics) -> GateEvaluation {
        let c = &self.config;
        let mut failures = Vec::new();

        let rule = h.falsification.rule.clone();
        let mut falsified = false;
        if let Some(rule) = &rule {
            match metrics.metric(&rule.metric) {
                Some(observed) if rule.triggers(observed) => {
                    falsified = true;
                    failures.push(GateFailure::Falsified {
                        rule: rule.to_string(),
                        observed,
                    });
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        hypothesis_id = %h.id,
                        metric = %rule.metric,
                        "falsification rule names an unknown metric; ignoring"
                    );
                }
            }
        }

        if !(metrics.deflated_sharpe >= c.min_deflated_sharpe) {
            failures.push(GateFailure::DeflatedSharpe {
                value: metrics.deflated_sharpe,
                threshold: c.min_deflated_sharpe,
            });
        }
        if !(metrics.pbo <= c.max_pbo) {
            failures.push(GateFailure::Pbo {
                value: metrics.pbo,
                threshold: c.max_pbo,
            });
        }
        if !(metrics.family_risk <= c.max_family_risk) {
            failures.push(GateFailure::FamilyRisk {
                value: metrics.family_risk,
                threshold: c.max_family_risk,
            });
        }

        let verdict = if falsified {
            GateVerdict::Falsified
        } else if failures.is_empty() {
            GateVerdict::Pass
        } else {
            GateVerdict::Fail
        };

        GateEvaluation {
            hypothesis_id: h.id.clone(),
            experiment_id: experiment_id.to_string(),
            metrics,
            rule,
            falsified,
            verdict,
            failures,
        }
    }
}

// ─── Forced exploration ──────────────────────────────────────────────

/// Forced-exploration selection: the birth-score cutoff and who cleared it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationSelection<'a> {
    /// NaN when no hypothesis has a birth score.
    pub cutoff: f64,
    pub candidates: Vec<&'a Hypothesis>,
}

/// Hypotheses whose birth score is at or above the `quantile_level` quantile
/// of all known birth scores and that have no audit entry yet. Input order is
/// preserved.
pub fn select_exploration_candidates<'a>(
    hypotheses: &'a [Hypothesis],
    audited: &BTreeSet<String>,
    quantile_level: f64,
) -> ExplorationSelection<'a> {
    let scores: Vec<f64> = hypotheses.iter().filter_map(|h| h.birth_score).collect();
    let cutoff = quantile(&scores, quantile_level);
    if !cutoff.is_finite() {
        return ExplorationSelection {
            cutoff,
            candidates: Vec::new(),
        };
    }
    let candidates = hypotheses
        .iter()
        .filter(|h| h.birth_score.is_some_and(|s| s.is_finite() && s >= cutoff))
        .filter(|h| !audited.contains(&h.id))
        .collect();
    ExplorationSelection { cutoff, candidates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FalsificationCriteria;
    use chrono::{TimeZone, Utc};

    fn hypothesis(rule: &str) -> Hypothesis {
        Hypothesis {
            id: "hyp-1".into(),
            statement: "ETH basis above 10% annualized mean-reverts within a week".into(),
            rationale: "Carry traders close the basis because funding costs rise.".into(),
            target_asset: "ETH".into(),
            regime_filter: None,
            current_confidence: 0.5,
            falsification: FalsificationCriteria::declare(rule, Some(30)),
            take_profit_pct: Some(1.5),
            trial_count: 2,
            prior_hypotheses_count: 0,
            parameter_count: 2,
            birth_score: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            tier1_result: None,
            deflated_sharpe_estimate: None,
            pbo_probability: None,
            family_inflation_risk: None,
        }
    }

    fn metrics(deflated: f64, pbo: f64, family: f64, win_rate: f64) -> OverfittingMetrics {
        OverfittingMetrics {
            n_outcomes: 40,
            win_rate,
            mean_return: 0.8,
            observed_sharpe: 0.4,
            skewness: 0.0,
            kurtosis: 3.0,
            n_trials: 2,
            deflated_sharpe: deflated,
            pbo,
            family_risk: family,
        }
    }

    fn gate() -> OverfittingPromotionGate {
        OverfittingPromotionGate::new(GateConfig::default())
    }

    #[test]
    fn all_thresholds_met_passes() {
        let eval = gate().decide(&hypothesis("win_rate < 0.45"), "exp-1", metrics(1.2, 0.30, 0.10, 0.60));
        assert_eq!(eval.verdict, GateVerdict::Pass);
        assert!(!eval.falsified);
        assert_eq!(eval.failure_reason(), None);
    }

    #[test]
    fn falsification_overrides_good_metrics() {
        let eval = gate().decide(&hypothesis("win_rate < 0.45"), "exp-1", metrics(3.0, 0.0, 0.05, 0.40));
        assert_eq!(eval.verdict, GateVerdict::Falsified);
        assert!(eval.falsified);
        assert!(eval.failure_reason().unwrap().contains("win_rate < 0.45"));
    }

    #[test]
    fn every_violation_is_listed() {
        let eval = gate().decide(&hypothesis(""), "exp-1", metrics(0.2, 0.8, 0.5, 0.6));
        assert_eq!(eval.verdict, GateVerdict::Fail);
        assert_eq!(eval.failures.len(), 3);
        let reason = eval.failure_reason().unwrap();
        assert!(reason.contains("deflated_sharpe"));
        assert!(reason.contains("pbo"));
        assert!(reason.contains("family_risk"));
    }

    #[test]
    fn boundaries_are_inclusive() {
        let eval = gate().decide(&hypothesis(""), "exp-1", metrics(1.0, 0.5, 0.3, 0.6));
        assert_eq!(eval.verdict, GateVerdict::Pass);
    }

    #[test]
    fn malformed_rule_is_treated_as_absent() {
        let h = hypothesis("win rate is bad");
        assert!(h.falsification.rule.is_none());
        let eval = gate().decide(&h, "exp-1", metrics(1.2, 0.3, 0.1, 0.10));
        assert_eq!(eval.verdict, GateVerdict::Pass);
    }

    #[test]
    fn unknown_metric_never_triggers() {
        let eval = gate().decide(&hypothesis("sortino < 5"), "exp-1", metrics(1.2, 0.3, 0.1, 0.5));
        assert_eq!(eval.verdict, GateVerdict::Pass);
    }

    #[test]
    fn nan_metrics_fail_closed() {
        let eval = gate().decide(&hypothesis(""), "exp-1", metrics(f64::NAN, 0.3, 0.1, 0.5));
        assert_eq!(eval.verdict, GateVerdict::Fail);
    }

    #[test]
    fn sample_size_precondition() {
        let g = gate();
        let mut h = hypothesis("");
        assert!(!g.is_ready(&h, 29));
        assert!(g.is_ready(&h, 30));
        h.falsification.min_sample_size = None;
        assert_eq!(g.min_sample_size(&h), 30);
        h.falsification.min_sample_size = Some(10);
        assert!(g.is_ready(&h, 10));
    }

    #[test]
    fn n_trials_takes_maximum() {
        let mut h = hypothesis("");
        h.trial_count = 0;
        h.prior_hypotheses_count = 0;
        assert_eq!(OverfittingPromotionGate::n_trials(&h, 0), 1);
        h.prior_hypotheses_count = 4;
        assert_eq!(OverfittingPromotionGate::n_trials(&h, 6), 6);
        assert_eq!(OverfittingPromotionGate::n_trials(&h, 2), 4);
    }

    #[test]
    fn exploration_selects_top_unaudited() {
        let hyps: Vec<Hypothesis> = (0..20)
            .map(|i| {
                let mut h = hypothesis("");
                h.id = format!("hyp-{i:02}");
                h.birth_score = Some(i as f64 / 20.0);
                h
            })
            .collect();
        let picked = select_exploration_candidates(&hyps, &BTreeSet::new(), 0.95);
        assert_eq!(picked.candidates.len(), 1);
        assert_eq!(picked.candidates[0].id, "hyp-19");
        assert!((picked.cutoff - 0.9025).abs() < 1e-9);

        let audited: BTreeSet<String> = ["hyp-19".to_string()].into_iter().collect();
        assert!(select_exploration_candidates(&hyps, &audited, 0.95).candidates.is_empty());
    }

    #[test]
    fn exploration_without_birth_scores_selects_nothing() {
        let hyps = vec![hypothesis("")];
        let picked = select_exploration_candidates(&hyps, &BTreeSet::new(), 0.95);
        assert!(picked.candidates.is_empty());
        assert!(picked.cutoff.is_nan());
    }

    #[test]
    fn verdict_round_trips_through_str() {
        for v in [
            GateVerdict::Pass,
            GateVerdict::Fail,
            GateVerdict::Falsified,
            GateVerdict::ExplorationPass,
        ] {
            assert_eq!(v.as_str().parse::<GateVerdict>().unwrap(), v);
        }
    }
}
