//! Regime-diversity circuit breaker.
//!
//! Percentile ranks over a single-regime population produce discrimination
//! that does not exist. The scorer therefore refuses to run unless the
//! non-dominant regimes make up at least `min_non_dominant_pct` of the
//! evaluable population.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::Signal;

/// Snapshot of `{regime label -> signal count}` over the evaluable population.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeDistribution {
    pub counts: BTreeMap<String, usize>,
}

impl RegimeDistribution {
    pub fn from_signals<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Self {
        let mut counts = BTreeMap::new();
        for s in signals {
            *counts.entry(s.regime_label().to_string()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Most populous regime. Ties resolve to the lexicographically first label.
    pub fn dominant(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (label, &count) in &self.counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label.as_str(), count));
            }
        }
        best
    }

    /// Share of the population outside the dominant regime, in percent.
    ///
    /// Multiplies before dividing so exact boundaries (1500 of 10000) land on
    /// exactly 15.0. An empty population has 0% diversity.
    pub fn non_dominant_pct(&self) -> f64 {
        let total = self.total();
        match self.dominant() {
            Some((_, dominant)) if total > 0 => {
                ((total - dominant) as f64 * 100.0) / total as f64
            }
            _ => 0.0,
        }
    }
}

/// Outcome of `check_diversity()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityCheck {
    pub distribution: RegimeDistribution,
    pub dominant_regime: Option<String>,
    pub non_dominant_pct: f64,
    pub threshold_pct: f64,
}

impl DiversityCheck {
    pub fn evaluate(distribution: RegimeDistribution, threshold_pct: f64) -> Self {
        let dominant_regime = distribution.dominant().map(|(l, _)| l.to_string());
        let non_dominant_pct = distribution.non_dominant_pct();
        Self {
            distribution,
            dominant_regime,
            non_dominant_pct,
            threshold_pct,
        }
    }

    pub fn passed(&self) -> bool {
        self.distribution.total() > 0 && self.non_dominant_pct >= self.threshold_pct
    }
}

/// The batch-level refusal to score. Carries everything the hard-stop audit event needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardStop {
    pub distribution: RegimeDistribution,
    pub dominant_regime: Option<String>,
    pub non_dominant_pct: f64,
    pub threshold_pct: f64,
    /// Signals that went unscored because of the stop.
    pub blocked_count: usize,
}

impl From<DiversityCheck> for HardStop {
    fn from(check: DiversityCheck) -> Self {
        let blocked_count = check.distribution.total();
        Self {
            distribution: check.distribution,
            dominant_regime: check.dominant_regime,
            non_dominant_pct: check.non_dominant_pct,
            threshold_pct: check.threshold_pct,
            blocked_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(pairs: &[(&str, usize)]) -> RegimeDistribution {
        RegimeDistribution {
            counts: pairs.iter().map(|(l, c)| (l.to_string(), *c)).collect(),
        }
    }

    #[test]
    fn exact_boundary_is_exact() {
        let d = dist(&[("bull", 8500), ("bear", 1500)]);
        assert_eq!(d.non_dominant_pct(), 15.0);
        assert!(DiversityCheck::evaluate(d, 15.0).passed());
    }

    #[test]
    fn just_below_boundary_fails() {
        let d = dist(&[("bull", 8501), ("bear", 1499)]);
        assert!((d.non_dominant_pct() - 14.99).abs() < 1e-9);
        assert!(!DiversityCheck::evaluate(d, 15.0).passed());
    }

    #[test]
    fn single_regime_has_zero_diversity() {
        let d = dist(&[("bull", 40)]);
        assert_eq!(d.non_dominant_pct(), 0.0);
    }

    #[test]
    fn empty_population_fails() {
        let check = DiversityCheck::evaluate(RegimeDistribution::default(), 0.0);
        assert!(!check.passed());
        assert_eq!(check.dominant_regime, None);
    }

    #[test]
    fn dominant_tie_resolves_deterministically() {
        let d = dist(&[("b", 5), ("a", 5), ("c", 1)]);
        assert_eq!(d.dominant(), Some(("a", 5)));
        assert!((d.non_dominant_pct() - 600.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn hard_stop_blocks_whole_population() {
        let check = DiversityCheck::evaluate(dist(&[("bull", 9), ("bear", 1)]), 15.0);
        let stop = HardStop::from(check);
        assert_eq!(stop.blocked_count, 10);
        assert_eq!(stop.dominant_regime.as_deref(), Some("bull"));
    }
}
