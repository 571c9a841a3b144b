//! Phase A — semantic coherence, logical consistency, adversarial probe.

use crate::config::ShadowConfig;
use crate::domain::Hypothesis;

use super::text::{alpha_ratio, count_cues, joined_lower, word_count};
use super::PhaseScore;

pub fn evaluate(h: &Hypothesis, cfg: &ShadowConfig) -> PhaseScore {
    let semantic = semantic_coherence(h, cfg);
    let logical = logical_consistency(h, cfg);
    let adversarial = adversarial_probe(h, cfg);

    let score = cfg.semantic_weight * semantic
        + cfg.logical_weight * logical
        + cfg.adversarial_weight * adversarial;

    PhaseScore::new(score, cfg.phase_a_pass)
        .with("semantic_coherence", semantic)
        .with("logical_consistency", logical)
        .with("adversarial_probe", adversarial)
}

/// Statement length, alphabetic content and domain vocabulary.
pub fn semantic_coherence(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    let length = match word_count(&h.statement) {
        0..=4 => 0.2,
        5..=9 => 0.6,
        10..=80 => 1.0,
        _ => 0.7,
    };
    let alpha = (alpha_ratio(&h.statement) / 0.6).min(1.0);
    let text = joined_lower(&[&h.statement, &h.rationale]);
    let keywords = (count_cues(&text, &cfg.domain_keywords) as f64 / 2.0).min(1.0);

    (0.4 * length + 0.3 * alpha + 0.3 * keywords).clamp(0.0, 1.0)
}

/// Causal reasoning in the rationale; overconfidence costs, a parseable
/// falsification rule earns.
pub fn logical_consistency(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    let text = joined_lower(&[&h.statement, &h.rationale]);
    let causal = (0.1 * count_cues(&text, &cfg.causal_cues) as f64).min(0.3);
    let overconfident = 0.15 * count_cues(&text, &cfg.overconfident_terms) as f64;
    let rule = if h.falsification.is_well_formed() { 0.2 } else { 0.0 };

    (0.5 + causal - overconfident + rule).clamp(0.0, 1.0)
}

/// How well the hypothesis survives a skeptic: can it be proven wrong, is it
/// time-bound, does it claim certainty, does it explain itself.
pub fn adversarial_probe(h: &Hypothesis, cfg: &ShadowConfig) -> f64 {
    let statement = joined_lower(&[&h.statement]);
    let text = joined_lower(&[&h.statement, &h.rationale]);

    let mut score = 0.6;
    if h.falsification.is_well_formed() {
        score += 0.2;
    }
    if count_cues(&statement, &cfg.time_bound_cues) > 0 {
        score += 0.1;
    }
    score -= 0.2 * count_cues(&text, &cfg.overconfident_terms) as f64;
    if h.rationale.trim().is_empty() {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}
