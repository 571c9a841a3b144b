//! Percentile quality scoring — population-relative evidence quality.
//!
//! The absolute base score (confluence factor count) saturates quickly, so it
//! is topped up with four cross-sectional percentile ranks:
//!
//! | sub-metric        | raw value                                   | weight |
//! |-------------------|---------------------------------------------|--------|
//! | SITC completeness | completed / total (NaN when total is 0)     | 0.15   |
//! | factor quality    | criticality-weighted share of factor flags  | 0.10   |
//! | category strength | table lookup, averaged over `a|b` categories| 0.10   |
//! | recency           | signal age in hours, inverted               | 0.05   |
//!
//! The regime-diversity check always runs first. A failed check returns
//! `ScoreBatchResult::HardStopped` and no score at all.

pub mod diversity;
pub mod tier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ScorerConfig;
use crate::domain::{Lifecycle, Signal, Tier};
use crate::hashing::ContentHash;
use crate::stats::{mean, percentile_ranks};

pub use diversity::{DiversityCheck, HardStop, RegimeDistribution};
pub use tier::{assign_tier, tier_edges};

// ─── Result types ────────────────────────────────────────────────────

/// Per-row failure. The row is skipped; the batch continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RowError {
    #[error("signal {signal_id}: negative confluence factor count {count}")]
    NegativeFactorCount { signal_id: String, count: i64 },
    #[error("signal {signal_id}: invalid SITC progress {completed}/{total}")]
    InvalidSitc {
        signal_id: String,
        completed: i64,
        total: i64,
    },
    #[error("signal {signal_id}: created_at {created_at} is in the future")]
    FutureTimestamp {
        signal_id: String,
        created_at: DateTime<Utc>,
    },
}

impl RowError {
    pub fn signal_id(&self) -> &str {
        match self {
            RowError::NegativeFactorCount { signal_id, .. }
            | RowError::InvalidSitc { signal_id, .. }
            | RowError::FutureTimestamp { signal_id, .. } => signal_id,
        }
    }
}

/// Raw sub-metrics of one signal, before ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubMetrics {
    pub base_score: f64,
    /// NaN when the signal has no SITC nodes.
    pub sitc_completeness: f64,
    pub factor_quality: f64,
    pub category_strength: f64,
    pub age_hours: f64,
}

/// Fully scored signal, including everything the audit row records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub signal_id: String,
    pub metrics: SubMetrics,
    pub sitc_pct: f64,
    pub factor_pct: f64,
    pub category_pct: f64,
    pub recency_pct: f64,
    pub quality_score: f64,
    pub tier: Tier,
    pub input_hash: ContentHash,
    pub formula_hash: ContentHash,
}

/// Scores for a batch that passed the diversity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBatch {
    pub diversity: DiversityCheck,
    pub scores: Vec<SignalScore>,
    pub skipped: Vec<RowError>,
    pub formula_hash: ContentHash,
}

/// Either a full batch of scores or a hard stop. Callers must handle both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoreBatchResult {
    Scored(ScoredBatch),
    HardStopped(HardStop),
}

impl ScoreBatchResult {
    pub fn is_hard_stopped(&self) -> bool {
        matches!(self, ScoreBatchResult::HardStopped(_))
    }
}

// ─── Scorer ──────────────────────────────────────────────────────────

/// Population-relative quality scorer.
#[derive(Debug, Clone)]
pub struct PercentileQualityScorer {
    config: ScorerConfig,
    formula_hash: ContentHash,
}

impl PercentileQualityScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let formula_hash = config.formula_hash();
        Self {
            config,
            formula_hash,
        }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn formula_hash(&self) -> &ContentHash {
        &self.formula_hash
    }

    /// Regime diversity of the evaluable (dormant) part of `population`.
    pub fn check_diversity(&self, population: &[Signal]) -> DiversityCheck {
        let distribution = RegimeDistribution::from_signals(evaluable(population));
        DiversityCheck::evaluate(distribution, self.config.min_non_dominant_pct)
    }

    /// Score the evaluable population as of `now`.
    pub fn score(&self, population: &[Signal], now: DateTime<Utc>) -> ScoreBatchResult {
        let diversity = self.check_diversity(population);
        if !diversity.passed() {
            let stop = HardStop::from(diversity);
            tracing::error!(
                non_dominant_pct = stop.non_dominant_pct,
                threshold_pct = stop.threshold_pct,
                blocked = stop.blocked_count,
                dominant = ?stop.dominant_regime,
                "insufficient regime diversity: refusing to score batch"
            );
            return ScoreBatchResult::HardStopped(stop);
        }

        let mut rows: Vec<(&Signal, SubMetrics)> = Vec::new();
        let mut skipped = Vec::new();
        for signal in evaluable(population) {
            match self.sub_metrics(signal, now) {
                Ok(m) => rows.push((signal, m)),
                Err(e) => {
                    tracing::warn!(signal_id = %signal.id, error = %e, "skipping signal");
                    skipped.push(e);
                }
            }
        }

        let column = |f: fn(&SubMetrics) -> f64| -> Vec<f64> { rows.iter().map(|(_, m)| f(m)).collect() };
        let sitc_pct = percentile_ranks(&column(|m| m.sitc_completeness));
        let factor_pct = percentile_ranks(&column(|m| m.factor_quality));
        let category_pct = percentile_ranks(&column(|m| m.category_strength));
        let recency_pct = percentile_ranks(&column(|m| -m.age_hours));

        let c = &self.config;
        let composites: Vec<f64> = rows
            .iter()
            .enumerate()
            .map(|(i, (_, m))| {
                let raw = m.base_score
                    + c.sitc_weight * sitc_pct[i]
                    + c.factor_weight * factor_pct[i]
                    + c.category_weight * category_pct[i]
                    + c.recency_weight * recency_pct[i];
                raw.clamp(0.0, 1.0)
            })
            .collect();

        let edges = tier_edges(&composites, &c.tier_cut_points);

        let scores = rows
            .iter()
            .enumerate()
            .map(|(i, (signal, metrics))| {
                let score = SignalScore {
                    signal_id: signal.id.clone(),
                    metrics: *metrics,
                    sitc_pct: sitc_pct[i],
                    factor_pct: factor_pct[i],
                    category_pct: category_pct[i],
                    recency_pct: recency_pct[i],
                    quality_score: composites[i],
                    tier: assign_tier(composites[i], &edges),
                    input_hash: signal.input_hash(),
                    formula_hash: self.formula_hash.clone(),
                };
                tracing::debug!(
                    signal_id = %score.signal_id,
                    quality_score = score.quality_score,
                    tier = %score.tier,
                    input_hash = %score.input_hash,
                    formula_hash = %score.formula_hash,
                    "scored signal"
                );
                score
            })
            .collect();

        ScoreBatchResult::Scored(ScoredBatch {
            diversity,
            scores,
            skipped,
            formula_hash: self.formula_hash.clone(),
        })
    }

    /// Raw sub-metrics for one signal, validating its fields.
    pub fn sub_metrics(&self, signal: &Signal, now: DateTime<Utc>) -> Result<SubMetrics, RowError> {
        if signal.confluence_factor_count < 0 {
            return Err(RowError::NegativeFactorCount {
                signal_id: signal.id.clone(),
                count: signal.confluence_factor_count,
            });
        }
        let (done, total) = (signal.sitc_nodes_completed, signal.sitc_nodes_total);
        if done < 0 || total < 0 || done > total {
            return Err(RowError::InvalidSitc {
                signal_id: signal.id.clone(),
                completed: done,
                total,
            });
        }
        if signal.created_at > now {
            return Err(RowError::FutureTimestamp {
                signal_id: signal.id.clone(),
                created_at: signal.created_at,
            });
        }

        let c = &self.config;
        let base_score = (signal.confluence_factor_count as f64 / c.max_factor_count) * c.base_weight;
        let sitc_completeness = if total == 0 {
            f64::NAN
        } else {
            done as f64 / total as f64
        };

        Ok(SubMetrics {
            base_score,
            sitc_completeness,
            factor_quality: self.factor_quality(signal),
            category_strength: self.category_strength(signal),
            age_hours: (now - signal.created_at).num_seconds() as f64 / 3600.0,
        })
    }

    fn factor_quality(&self, signal: &Signal) -> f64 {
        let w = &self.config.factor_criticality;
        let f = &signal.factors;
        let weighted = [
            (f.price, w.price),
            (f.volume, w.volume),
            (f.temporal, w.temporal),
            (f.regime, w.regime),
            (f.testable, w.testable),
            (f.catalyst, w.catalyst),
        ]
        .iter()
        .filter(|(flag, _)| *flag)
        .map(|(_, weight)| weight)
        .sum::<f64>();
        weighted / w.total()
    }

    fn category_strength(&self, signal: &Signal) -> f64 {
        let strengths: Vec<f64> = signal
            .categories()
            .map(|cat| {
                self.config
                    .category_strength
                    .get(&cat.to_ascii_lowercase())
                    .copied()
                    .unwrap_or(self.config.unknown_category_strength)
            })
            .collect();
        if strengths.is_empty() {
            self.config.unknown_category_strength
        } else {
            mean(&strengths)
        }
    }
}

fn evaluable(population: &[Signal]) -> impl Iterator<Item = &Signal> {
    population.iter().filter(|s| s.lifecycle == Lifecycle::Dormant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FactorFlags;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn signal(id: &str, factors: i64, regime: &str, age_hours: i64) -> Signal {
        Signal {
            id: id.into(),
            confluence_factor_count: factors,
            sitc_nodes_completed: factors.clamp(0, 5),
            sitc_nodes_total: 5,
            category: "momentum".into(),
            created_at: now() - Duration::hours(age_hours),
            factors: FactorFlags {
                price: factors > 2,
                volume: factors > 4,
                ..FactorFlags::default()
            },
            regime: Some(regime.into()),
            lifecycle: Lifecycle::Dormant,
            quality_score: None,
            tier: None,
        }
    }

    fn diverse_population() -> Vec<Signal> {
        (0..10)
            .map(|i| signal(&format!("s{i}"), i % 8, if i < 7 { "bull" } else { "bear" }, i))
            .collect()
    }

    fn scorer() -> PercentileQualityScorer {
        PercentileQualityScorer::new(ScorerConfig::default())
    }

    #[test]
    fn toml_category_keys_match_regardless_of_case() {
        let config = crate::config::EvidenceConfig::from_toml("[scorer.category_strength]\nMomentum = 0.9\n").unwrap();
        let scorer = PercentileQualityScorer::new(config.scorer);
        let mut s = signal("s1", 3, "bull", 1);
        assert!((scorer.category_strength(&s) - 0.9).abs() < 1e-12);
        s.category = "MOMENTUM|Sentiment".into();
        // sentiment is absent from this table and falls back to unknown
        assert!((scorer.category_strength(&s) - (0.9 + 0.40) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn single_regime_hard_stops() {
        let pop: Vec<Signal> = (0..10).map(|i| signal(&format!("s{i}"), 3, "bull", i)).collect();
        match scorer().score(&pop, now()) {
            ScoreBatchResult::HardStopped(stop) => {
                assert_eq!(stop.blocked_count, 10);
                assert_eq!(stop.non_dominant_pct, 0.0);
            }
            ScoreBatchResult::Scored(_) => panic!("expected hard stop"),
        }
    }

    #[test]
    fn diverse_population_scores_every_row() {
        let result = scorer().score(&diverse_population(), now());
        let ScoreBatchResult::Scored(batch) = result else {
            panic!("expected scores");
        };
        assert_eq!(batch.scores.len(), 10);
        assert!(batch.skipped.is_empty());
        for s in &batch.scores {
            assert!((0.0..=1.0).contains(&s.quality_score));
            assert_eq!(&s.formula_hash, scorer().formula_hash());
        }
    }

    #[test]
    fn non_dormant_signals_are_ignored() {
        let mut pop = diverse_population();
        pop[0].lifecycle = Lifecycle::Active;
        pop[1].lifecycle = Lifecycle::Retired;
        let ScoreBatchResult::Scored(batch) = scorer().score(&pop, now()) else {
            panic!("expected scores");
        };
        assert_eq!(batch.scores.len(), 8);
        assert_eq!(batch.diversity.distribution.total(), 8);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let mut pop = diverse_population();
        pop[2].sitc_nodes_completed = 9;
        pop[3].confluence_factor_count = -1;
        pop[4].created_at = now() + Duration::hours(1);
        let ScoreBatchResult::Scored(batch) = scorer().score(&pop, now()) else {
            panic!("expected scores");
        };
        assert_eq!(batch.scores.len(), 7);
        assert_eq!(batch.skipped.len(), 3);
        assert_eq!(batch.skipped[0].signal_id(), "s2");
    }

    #[test]
    fn base_score_formula() {
        let m = scorer().sub_metrics(&signal("x", 7, "bull", 1), now()).unwrap();
        assert!((m.base_score - 0.60).abs() < 1e-12);
        let m = scorer().sub_metrics(&signal("x", 0, "bull", 1), now()).unwrap();
        assert_eq!(m.base_score, 0.0);
    }

    #[test]
    fn zero_sitc_total_is_nan() {
        let mut s = signal("x", 3, "bull", 1);
        s.sitc_nodes_completed = 0;
        s.sitc_nodes_total = 0;
        let m = scorer().sub_metrics(&s, now()).unwrap();
        assert!(m.sitc_completeness.is_nan());
    }

    #[test]
    fn factor_quality_is_normalized() {
        let mut s = signal("x", 3, "bull", 1);
        s.factors = FactorFlags {
            price: true,
            volume: true,
            regime: true,
            temporal: true,
            catalyst: true,
            testable: true,
        };
        let m = scorer().sub_metrics(&s, now()).unwrap();
        assert!((m.factor_quality - 1.0).abs() < 1e-12);

        s.factors = FactorFlags {
            catalyst: true,
            ..FactorFlags::default()
        };
        let m = scorer().sub_metrics(&s, now()).unwrap();
        assert!((m.factor_quality - 0.5 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn multi_category_strength_is_averaged() {
        let mut s = signal("x", 3, "bull", 1);
        s.category = "momentum|sentiment".into();
        let m = scorer().sub_metrics(&s, now()).unwrap();
        assert!((m.category_strength - 0.65).abs() < 1e-12);

        s.category = "astrology".into();
        let m = scorer().sub_metrics(&s, now()).unwrap();
        assert!((m.category_strength - 0.40).abs() < 1e-12);
    }

    #[test]
    fn newer_signals_rank_higher_on_recency() {
        let ScoreBatchResult::Scored(batch) = scorer().score(&diverse_population(), now()) else {
            panic!("expected scores");
        };
        let newest = batch.scores.iter().find(|s| s.signal_id == "s0").unwrap();
        let oldest = batch.scores.iter().find(|s| s.signal_id == "s9").unwrap();
        assert_eq!(newest.recency_pct, 1.0);
        assert_eq!(oldest.recency_pct, 0.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let pop = diverse_population();
        assert_eq!(scorer().score(&pop, now()), scorer().score(&pop, now()));
    }
}
