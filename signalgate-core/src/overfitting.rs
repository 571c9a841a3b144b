//! Overfitting-corrected performance metrics.
//!
//! Implements from first principles:
//! - Per-trade Sharpe ratio (no risk-free adjustment)
//! - Deflated Sharpe ratio (Bailey & Lopez de Prado, 2014): expected maximum
//!   Sharpe under the null across `n_trials`, Lo (2002) estimator variance
//!   with skew and kurtosis
//! - Fold-based PBO estimate over outcome win rates
//! - Family-wise inflation risk from trial count and parameter count
//!
//! The PBO estimate and the family-wise term are heuristics. Their exact shape
//! is kept stable so replays compare against historical audit rows.

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::domain::Outcome;
use crate::stats::{inverse_normal_cdf, kurtosis, mean, skewness, std_dev, EULER_MASCHERONI};

// ─── Sharpe ──────────────────────────────────────────────────────────

/// mean / sample std of per-trade returns. 0.0 with fewer than two returns or
/// zero dispersion.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = std_dev(returns);
    if sd > 0.0 && sd.is_finite() {
        mean(returns) / sd
    } else {
        0.0
    }
}

/// Expected maximum Sharpe among `n_trials` independent null trials of
/// `n_obs` observations each.
pub fn expected_max_sharpe(n_trials: u32, n_obs: usize) -> f64 {
    if n_trials < 2 || n_obs < 2 {
        return 0.0;
    }
    let n = f64::from(n_trials);
    let z1 = inverse_normal_cdf(1.0 - 1.0 / n);
    let z2 = inverse_normal_cdf(1.0 - 1.0 / (n * std::f64::consts::E));
    let sr_std = (1.0 / (n_obs as f64 - 1.0)).sqrt();
    sr_std * ((1.0 - EULER_MASCHERONI) * z1 + EULER_MASCHERONI * z2)
}

/// Deflated Sharpe ratio: `(observed - expected_max) / estimator_std`.
///
/// Pure and deterministic. `kurtosis` is non-excess (3.0 for a normal
/// sample). Degenerate inputs (fewer than two observations, non-positive
/// estimator variance) yield 0.0.
pub fn compute_deflated_sharpe(
    observed_sharpe: f64,
    n_trials: u32,
    n_observations: usize,
    skew: f64,
    kurtosis: f64,
) -> f64 {
    if n_observations < 2 || !observed_sharpe.is_finite() {
        return 0.0;
    }
    let sr = observed_sharpe;
    let variance = (1.0 - skew * sr + (kurtosis - 1.0) / 4.0 * sr * sr) / (n_observations as f64 - 1.0);
    if !(variance > 0.0) || !variance.is_finite() {
        return 0.0;
    }
    let expected_max = expected_max_sharpe(n_trials.max(1), n_observations);
    (sr - expected_max) / variance.sqrt()
}

// ─── PBO ─────────────────────────────────────────────────────────────

/// Split `n` items into `k` contiguous folds; the first `n % k` folds get one extra.
fn fold_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let len = base + usize::from(i < extra);
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

/// Fraction of fold pairs whose win rates differ by more than the degradation gap.
///
/// `wins` must be in chronological order. Fewer than `pbo_min_outcomes`
/// outcomes return 1.0.
pub fn compute_pbo_estimate(wins: &[bool], cfg: &GateConfig) -> f64 {
    let n = wins.len();
    if n < cfg.pbo_min_outcomes.max(4) {
        return 1.0;
    }
    let k = cfg.pbo_max_folds.min(n / 2);
    if k < 2 {
        return 1.0;
    }

    let rates: Vec<f64> = fold_bounds(n, k)
        .into_iter()
        .map(|(s, e)| wins[s..e].iter().filter(|&&w| w).count() as f64 / (e - s) as f64)
        .collect();

    let mut pairs = 0usize;
    let mut degradations = 0usize;
    for i in 0..k {
        for j in (i + 1)..k {
            pairs += 1;
            if (rates[i] - rates[j]).abs() > cfg.pbo_degradation_gap {
                degradations += 1;
            }
        }
    }
    degradations as f64 / pairs as f64
}

// ─── Family-wise risk ────────────────────────────────────────────────

/// `max(1 - confidence^n_trials, min(1, n_params / parameter_budget))`.
pub fn family_inflation_risk(n_trials: u32, n_parameters: u32, cfg: &GateConfig) -> f64 {
    let multiple_testing = 1.0 - cfg.family_confidence.powf(f64::from(n_trials));
    let dof = (f64::from(n_parameters) / cfg.parameter_budget).min(1.0);
    multiple_testing.max(dof)
}

// ─── Combined metrics ────────────────────────────────────────────────

/// Every metric the promotion gate decides on, as recorded in the audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverfittingMetrics {
    pub n_outcomes: usize,
    pub win_rate: f64,
    pub mean_return: f64,
    pub observed_sharpe: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub n_trials: u32,
    pub deflated_sharpe: f64,
    pub pbo: f64,
    pub family_risk: f64,
}

impl OverfittingMetrics {
    /// Compute all metrics from an outcome set. Outcomes are ordered by
    /// `opened_at` before folding.
    pub fn compute(outcomes: &[Outcome], n_trials: u32, n_parameters: u32, cfg: &GateConfig) -> Self {
        let mut ordered: Vec<&Outcome> = outcomes.iter().collect();
        ordered.sort_by_key(|o| o.opened_at);

        let returns: Vec<f64> = ordered.iter().map(|o| o.return_pct).collect();
        let wins: Vec<bool> = ordered.iter().map(|o| o.won).collect();
        let n = returns.len();
        let n_trials = n_trials.max(1);

        let win_rate = if n == 0 {
            0.0
        } else {
            wins.iter().filter(|&&w| w).count() as f64 / n as f64
        };
        let observed_sharpe = sharpe_ratio(&returns);
        let skew = skewness(&returns);
        let kurt = kurtosis(&returns);

        Self {
            n_outcomes: n,
            win_rate,
            mean_return: if n == 0 { 0.0 } else { mean(&returns) },
            observed_sharpe,
            skewness: skew,
            kurtosis: kurt,
            n_trials,
            deflated_sharpe: compute_deflated_sharpe(observed_sharpe, n_trials, n, skew, kurt),
            pbo: compute_pbo_estimate(&wins, cfg),
            family_risk: family_inflation_risk(n_trials, n_parameters, cfg),
        }
    }

    /// Value of a named metric for falsification rules.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "win_rate" => Some(self.win_rate),
            "sharpe" => Some(self.observed_sharpe),
            "mean_return" => Some(self.mean_return),
            "deflated_sharpe" => Some(self.deflated_sharpe),
            "pbo" => Some(self.pbo),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn outcomes(returns: &[f64]) -> Vec<Outcome> {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        returns
            .iter()
            .enumerate()
            .map(|(i, &r)| Outcome {
                experiment_id: "exp-1".into(),
                won: r > 0.0,
                return_pct: r,
                opened_at: t0 + Duration::hours(i as i64),
                closed_at: None,
            })
            .collect()
    }

    #[test]
    fn sharpe_of_constant_returns_is_zero() {
        assert_eq!(sharpe_ratio(&[1.0, 1.0, 1.0]), 0.0);
        assert_eq!(sharpe_ratio(&[1.0]), 0.0);
    }

    #[test]
    fn expected_max_is_zero_for_one_trial() {
        assert_eq!(expected_max_sharpe(1, 50), 0.0);
        assert!(expected_max_sharpe(10, 50) > expected_max_sharpe(2, 50));
    }

    #[test]
    fn more_trials_deflate_more() {
        let few = compute_deflated_sharpe(0.5, 2, 60, 0.0, 3.0);
        let many = compute_deflated_sharpe(0.5, 200, 60, 0.0, 3.0);
        assert!(many < few);
    }

    #[test]
    fn deflated_sharpe_single_trial_normal_returns() {
        // Lo variance with skew 0, kurt 3: (1 + 0.5 * SR^2) / (n - 1)
        let sr: f64 = 0.3;
        let n = 101;
        let expected = sr / ((1.0 + 0.5 * sr * sr) / 100.0).sqrt();
        assert!((compute_deflated_sharpe(sr, 1, n, 0.0, 3.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn deflated_sharpe_degenerate_inputs() {
        assert_eq!(compute_deflated_sharpe(0.5, 5, 1, 0.0, 3.0), 0.0);
        // 1 - skew*SR < 0 with no kurtosis help
        assert_eq!(compute_deflated_sharpe(2.0, 5, 30, 5.0, 1.0), 0.0);
    }

    #[test]
    fn pbo_below_four_is_maximal() {
        let cfg = GateConfig::default();
        assert_eq!(compute_pbo_estimate(&[], &cfg), 1.0);
        assert_eq!(compute_pbo_estimate(&[true, true, true], &cfg), 1.0);
    }

    #[test]
    fn pbo_counts_degraded_fold_pairs() {
        let cfg = GateConfig::default();
        // n=4 -> 2 folds of 2: [1.0, 0.0] -> one degraded pair
        assert_eq!(compute_pbo_estimate(&[true, true, false, false], &cfg), 1.0);
        // stable folds
        assert_eq!(compute_pbo_estimate(&[true, false, true, false], &cfg), 0.0);
    }

    #[test]
    fn pbo_uses_at_most_five_folds() {
        let cfg = GateConfig::default();
        // 20 outcomes -> 5 folds of 4; only the last fold loses everything
        let mut wins = vec![true; 16];
        wins.extend([false; 4]);
        // 4 of 10 pairs involve the last fold
        assert!((compute_pbo_estimate(&wins, &cfg) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn fold_bounds_front_load_remainder() {
        assert_eq!(fold_bounds(7, 3), vec![(0, 3), (3, 5), (5, 7)]);
    }

    #[test]
    fn family_risk_takes_larger_term() {
        let cfg = GateConfig::default();
        assert!((family_inflation_risk(1, 0, &cfg) - 0.05).abs() < 1e-12);
        assert!((family_inflation_risk(1, 10, &cfg) - 0.5).abs() < 1e-12);
        assert!((family_inflation_risk(1, 40, &cfg) - 1.0).abs() < 1e-12);
        assert!(family_inflation_risk(100, 0, &cfg) > 0.99);
    }

    #[test]
    fn metrics_from_outcomes() {
        let cfg = GateConfig::default();
        let m = OverfittingMetrics::compute(&outcomes(&[1.0, -1.0, 2.0, 3.0]), 0, 0, &cfg);
        assert_eq!(m.n_outcomes, 4);
        assert_eq!(m.n_trials, 1);
        assert!((m.win_rate - 0.75).abs() < 1e-12);
        assert!((m.mean_return - 1.25).abs() < 1e-12);
        assert_eq!(m.metric("win_rate"), Some(m.win_rate));
        assert_eq!(m.metric("sortino"), None);
    }

    #[test]
    fn metrics_order_outcomes_chronologically() {
        let cfg = GateConfig::default();
        let mut set = outcomes(&[1.0, 1.0, -1.0, -1.0]);
        let forward = OverfittingMetrics::compute(&set, 1, 0, &cfg);
        set.reverse();
        assert_eq!(OverfittingMetrics::compute(&set, 1, 0, &cfg), forward);
    }
}
