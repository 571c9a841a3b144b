//! Phase B — statistical robustness.

use crate::config::ShadowConfig;
use crate::domain::Hypothesis;

use super::text::{count_cues, has_numeric_token, joined_lower};
use super::PhaseScore;

pub fn evaluate(
    h: &Hypothesis,
    current_regime: Option<&str>,
    prior_rejections: u32,
    cfg: &ShadowConfig,
) -> PhaseScore {
    let prior = regime_prior(h, current_regime, cfg);
    let significance = statistical_significance(h, cfg);
    let penalty = overfitting_penalty(prior_rejections, cfg);

    let score = (cfg.regime_prior_weight * prior + cfg.significance_weight * significance - penalty).max(0.0);

    PhaseScore::new(score, cfg.phase_b_pass)
        .with("regime_prior", prior)
        .with("statistical_significance", significance)
        .with("overfitting_penalty", penalty)
        .with("prior_rejections", f64::from(prior_rejections))
}

/// Prior plausibility given the hypothesis' regime filter and the current regime.
///
/// An unknown current regime never matches a declared filter.
pub fn regime_prior(h: &Hypothesis, current_regime: Option<&str>, cfg: &ShadowConfig) -> f64 {
    let confidence = h.current_confidence.clamp(0.0, 1.0);
    let filter = h.regime_filter.as_deref().map(str::trim).filter(|f| !f.is_empty());
    match filter {
        None => cfg.unfiltered_regime_prior,
        Some(filter) => {
            let matches = current_regime.is_some_and(|r| r.trim().eq_ignore_ascii_case(filter));
            if matches {
                cfg.regime_match_base + cfg.regime_match_confidence_weight * confidence
            } else {
                cfg.regime_mismatch_scale * (1.0 - confidence)
            }
        }
    }
}

/// Testability of the statement: numeric thresholds, time bounds, comparisons.
pub fn statistical_significance(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    let text = joined_lower(&[&h.statement]);
    let mut score: f64 = 0.3;
    if has_numeric_token(&text) {
        score += 0.25;
    }
    if count_cues(&text, &cfg.time_bound_cues) > 0 {
        score += 0.2;
    }
    if count_cues(&text, &cfg.comparison_cues) > 0 {
        score += 0.25;
    }
    score.min(1.0)
}

/// `min(cap, per_log2 * log2(N + 1))` for N prior rejections on the same asset.
pub fn overfitting_penalty(prior_rejections: u32, cfg: &ShadowConfig) -> f64 {
    (cfg.penalty_per_log2 * (f64::from(prior_rejections) + 1.0).log2()).min(cfg.penalty_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::tests::hypothesis;

    #[test]
    fn penalty_grows_logarithmically_and_caps() {
        let cfg = ShadowConfig::default();
        assert_eq!(overfitting_penalty(0, &cfg), 0.0);
        assert!((overfitting_penalty(1, &cfg) - 0.02).abs() < 1e-12);
        assert!((overfitting_penalty(3, &cfg) - 0.04).abs() < 1e-12);
        assert!((overfitting_penalty(1_000_000, &cfg) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn regime_prior_branches() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        h.current_confidence = 0.6;

        h.regime_filter = None;
        assert!((regime_prior(&h, Some("trending"), &cfg) - 0.70).abs() < 1e-12);

        h.regime_filter = Some("Trending".into());
        assert!((regime_prior(&h, Some("trending"), &cfg) - 0.92).abs() < 1e-12);
        assert!((regime_prior(&h, Some("choppy"), &cfg) - 0.20).abs() < 1e-12);
        assert!((regime_prior(&h, None, &cfg) - 0.20).abs() < 1e-12);
    }

    #[test]
    fn vague_statement_has_low_significance() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        h.statement = "Sentiment matters for crypto".into();
        assert!((statistical_significance(&h, &cfg) - 0.3).abs() < 1e-12);
        assert!((statistical_significance(&hypothesis(), &cfg) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn phase_b_never_negative() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        h.statement = "nothing testable".into();
        h.current_confidence = 1.0;
        let b = evaluate(&h, Some("choppy"), 1_000, &cfg);
        assert!(b.score >= 0.0);
        assert!(!b.passed);
    }
}
