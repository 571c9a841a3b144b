//! Quantile tiering of composite scores.

use crate::domain::Tier;
use crate::stats::quantile_sorted;

/// Score values at each quantile cut point of the batch.
pub fn tier_edges(scores: &[f64], cut_points: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    cut_points.iter().map(|&q| quantile_sorted(&sorted, q)).collect()
}

/// Bin a score into C/B/A/S using precomputed edges.
///
/// A score belongs to the first bin whose upper edge it does not exceed; the
/// lowest bin includes its lower edge. Duplicate edges therefore collapse
/// toward the lower tier.
pub fn assign_tier(score: f64, edges: &[f64]) -> Tier {
    for (i, tier) in Tier::ASCENDING.iter().enumerate() {
        match edges.get(i + 1) {
            Some(&upper) if score <= upper => return *tier,
            Some(_) => continue,
            None => break,
        }
    }
    Tier::S
}
