//! Phase C — economic coherence: can the idea actually be traded?

use crate::config::ShadowConfig;
use crate::domain::Hypothesis;

use super::text::{count_cues, joined_lower, percentages};
use super::PhaseScore;

pub fn evaluate(h: &Hypothesis, cfg: &ShadowConfig) -> PhaseScore {
    let liquidity = liquidity_feasibility(h, cfg);
    let latency = latency_assumption(h, cfg);
    let slippage = slippage_feasibility(h, cfg);

    let score = cfg.liquidity_weight * liquidity + cfg.latency_weight * latency + cfg.slippage_weight * slippage;

    PhaseScore::new(score, cfg.phase_c_pass)
        .with("liquidity_feasibility", liquidity)
        .with("latency_assumption", latency)
        .with("slippage_feasibility", slippage)
}

pub fn liquidity_feasibility(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    cfg.liquidity_score(cfg.liquidity_tier(&h.target_asset))
}

/// Penalizes instantaneous-reaction language, rewards session-scale horizons.
pub fn latency_assumption(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    let text = joined_lower(&[&h.statement, &h.rationale]);
    let instant = count_cues(&text, &cfg.instant_cues) as f64;
    let session = count_cues(&text, &cfg.session_cues) as f64;
    (0.7 - 0.3 * instant + 0.2 * session).clamp(0.0, 1.0)
}

/// Larger stated targets relative to the assumed slippage score higher.
///
/// The take-profit level is the explicit field when present, otherwise the
/// largest percentage in the text.
pub fn slippage_feasibility(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    let text = joined_lower(&[&h.statement, &h.rationale]);
    let largest = percentages(&text).into_iter().fold(None, |acc: Option<f64>, p| {
        Some(acc.map_or(p, |a| a.max(p)))
    });

    let mut score = match largest {
        Some(pct) => (0.4 + 0.06 * (pct / cfg.assumed_slippage_pct)).min(1.0),
        None => 0.6,
    };
    let take_profit = h.take_profit_pct.or(largest);
    if take_profit.is_some_and(|tp| tp < cfg.min_take_profit_pct) {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::tests::hypothesis;

    #[test]
    fn liquidity_follows_asset_tier() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        assert!((liquidity_feasibility(&h, &cfg) - 0.95).abs() < 1e-12);
        h.target_asset = "bonk".into();
        assert!((liquidity_feasibility(&h, &cfg) - 0.60).abs() < 1e-12);
        h.target_asset = "XYZ".into();
        assert!((liquidity_feasibility(&h, &cfg) - 0.70).abs() < 1e-12);
    }

    #[test]
    fn instant_reaction_language_hurts_latency() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        h.statement = "Front-run the print and exit immediately".into();
        h.rationale = "Speed is the edge.".into();
        assert!((latency_assumption(&h, &cfg) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn tiny_take_profit_is_penalized() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        h.statement = "Scalp a 0.3% move after the open".into();
        h.rationale = "Opening auction imbalance.".into();
        h.take_profit_pct = None;
        // 0.4 + 0.06 * 3 - 0.3
        assert!((slippage_feasibility(&h, &cfg) - 0.28).abs() < 1e-9);
    }

    #[test]
    fn no_stated_target_is_neutral() {
        let cfg = ShadowConfig::default();
        let mut h = hypothesis();
        h.statement = "Funding spikes precede reversals".into();
        h.rationale = "Crowding.".into();
        h.take_profit_pct = None;
        assert!((slippage_feasibility(&h, &cfg) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn large_target_saturates() {
        let cfg = ShadowConfig::default();
        assert!((slippage_feasibility(&hypothesis(), &cfg) - 1.0).abs() < 1e-12);
    }
}
