//! Statistics primitives shared by the scorer and the promotion gate.
//!
//! Implemented from first principles:
//! - Sample mean, sample standard deviation (n - 1)
//! - Population skewness and (non-excess) kurtosis
//! - Cross-sectional percentile ranks with averaged ties
//! - Linear-interpolation quantiles
//! - Acklam's rational approximation of the inverse standard normal CDF

// ─── Moments ─────────────────────────────────────────────────────────

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Returns 0.0 with fewer than 2 values.
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}

/// Population skewness `m3 / m2^1.5`. Returns 0.0 for constant or tiny samples.
pub fn skewness(values: &[f64]) -> f64 {
    let (m2, m3, _) = central_moments(values);
    if m2 < 1e-15 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Population kurtosis `m4 / m2^2` (a normal distribution gives 3.0).
///
/// Constant or tiny samples return 3.0 so downstream variance formulas see the
/// normal-distribution value rather than a division by zero.
pub fn kurtosis(values: &[f64]) -> f64 {
    let (m2, _, m4) = central_moments(values);
    if m2 < 1e-15 {
        return 3.0;
    }
    m4 / (m2 * m2)
}

fn central_moments(values: &[f64]) -> (f64, f64, f64) {
    if values.len() < 2 {
        return (0.0, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let m = mean(values);
    let mut m2 = 0.0;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &x in values {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

// ─── Ranking ─────────────────────────────────────────────────────────

/// Percentile rank of each value within the slice, 0.0 = lowest, 1.0 = highest.
///
/// Ties share their average rank. Non-finite values are excluded from the
/// ranking and receive 0.0. A population with a single finite value ranks it
/// at 0.5.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let mut ranks = vec![0.0; values.len()];
    let mut finite: Vec<(usize, f64)> = values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();

    let n = finite.len();
    if n == 0 {
        return ranks;
    }
    if n == 1 {
        ranks[finite[0].0] = 0.5;
        return ranks;
    }

    finite.sort_by(|a, b| a.1.total_cmp(&b.1));

    let denom = (n - 1) as f64;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && finite[j + 1].1 == finite[i].1 {
            j += 1;
        }
        // positions i..=j tie; zero-based average position
        let avg_pos = (i + j) as f64 / 2.0;
        for &(idx, _) in &finite[i..=j] {
            ranks[idx] = avg_pos / denom;
        }
        i = j + 1;
    }
    ranks
}

/// Quantile of an ascending-sorted slice using linear interpolation.
///
/// `q` is clamped to [0, 1]. Returns NaN for an empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Quantile of an unsorted slice; non-finite values are ignored.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

// ─── Normal distribution ─────────────────────────────────────────────

/// Euler–Mascheroni constant γ.
#[allow(clippy::excessive_precision)]
pub const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_860_6;

/// Inverse standard normal CDF Φ⁻¹(p) (Acklam, relative error < 1.2e-9).
///
/// Returns ±infinity at the boundaries and NaN outside [0, 1].
pub fn inverse_normal_cdf(p: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    #[allow(clippy::excessive_precision)]
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    #[allow(clippy::excessive_precision)]
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    #[allow(clippy::excessive_precision)]
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
