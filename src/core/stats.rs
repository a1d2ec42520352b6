//! core/stats.rs - Rank correlation, significance and scaling helpers.
//!
//! Degenerate inputs (constant series) produce NaN, mirroring the usual
//! statistical convention; callers decide where NaN is canonicalized.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Correlation coefficient with its two-sided p-value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correlation {
    pub r: f64,
    pub p: f64,
}

impl Correlation {
    pub const UNDEFINED: Correlation = Correlation {
        r: f64::NAN,
        p: f64::NAN,
    };
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson r. NaN when either series has zero variance.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let mean_x = mean(x);
    let mean_y = mean(y);
    let mut num = 0.0f64;
    let mut den_x = 0.0f64;
    let mut den_y = 0.0f64;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }
    let den = (den_x * den_y).sqrt();
    if den > 0.0 {
        (num / den).clamp(-1.0, 1.0)
    } else {
        f64::NAN
    }
}

/// 1-based ranks; ties share their average rank.
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));
    let mut ranks = vec![0.0f64; values.len()];
    let mut i = 0usize;
    while i < indexed.len() {
        let start = i;
        let val = indexed[i].1;
        let mut end = i + 1;
        while end < indexed.len() && indexed[end].1 == val {
            end += 1;
        }
        let rank = (start + end - 1) as f64 * 0.5 + 1.0;
        for entry in &indexed[start..end] {
            ranks[entry.0] = rank;
        }
        i = end;
    }
    ranks
}

/// Spearman rank correlation with a t-distribution p-value (n - 2 dof).
pub fn spearman(x: &[f64], y: &[f64]) -> Correlation {
    if x.len() != y.len() || x.len() < 2 {
        return Correlation::UNDEFINED;
    }
    let r = pearson_r(&ranks(x), &ranks(y));
    Correlation {
        r,
        p: correlation_p_value(r, x.len()),
    }
}

pub fn spearman_views(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Correlation {
    let xs: Vec<f64> = x.iter().copied().collect();
    let ys: Vec<f64> = y.iter().copied().collect();
    spearman(&xs, &ys)
}

/// Two-sided p-value of a correlation coefficient over `n` samples, from
/// Student's t with `n - 2` degrees of freedom.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if !r.is_finite() || n < 3 {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / ((1.0 + r) * (1.0 - r))).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Rescale every column independently into [0, 1]. Constant columns map to 0.
pub fn min_max_columns(m: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = m.to_owned();
    for mut col in out.axis_iter_mut(Axis(1)) {
        let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = hi - lo;
        let scale = if range > 0.0 { 1.0 / range } else { 1.0 };
        col.mapv_inplace(|v| (v - lo) * scale);
    }
    out
}

/// Coefficient of determination. A constant target scores 1.0 when matched
/// exactly and 0.0 otherwise.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let n = y_true.len();
    if n == 0 || n != y_pred.len() {
        return f64::NAN;
    }
    let mean_true = y_true.sum() / n as f64;
    let mut ss_res = 0.0f64;
    let mut ss_tot = 0.0f64;
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        ss_res += (t - p) * (t - p);
        ss_tot += (t - mean_true) * (t - mean_true);
    }
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Replace NaN with 0.0.
#[inline]
pub fn nan_to_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ranks_ties_average_rank() {
        let ranked = ranks(&[1.0, 1.0, 2.0]);
        assert_eq!(ranked, vec![1.5, 1.5, 3.0]);
        let ranked = ranks(&[3.0, 1.0, 2.0, 1.0]);
        assert_eq!(ranked, vec![4.0, 1.5, 3.0, 1.5]);
    }

    #[test]
    fn pearson_r_perfect_and_degenerate() {
        let x = [1.0, 2.0, 3.0];
        assert!((pearson_r(&x, &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        assert!((pearson_r(&x, &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(pearson_r(&x, &[1.0, 1.0, 1.0]).is_nan());
    }

    #[test]
    fn spearman_is_rank_based() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        let c = spearman(&x, &y);
        assert!((c.r - 1.0).abs() < 1e-12);
        assert_eq!(c.p, 0.0);
    }

    #[test]
    fn spearman_p_value_matches_t_distribution() {
        // r = 0.5 over 10 samples: t = 0.5 * sqrt(8 / 0.75) = 1.63299, p ≈ 0.14121
        let p = correlation_p_value(0.5, 10);
        assert!((p - 0.1412).abs() < 5e-4, "p = {p}");
    }

    #[test]
    fn p_value_closed_forms() {
        // n = 3 gives df = 1 (Cauchy); r = 1/sqrt(2) maps to t = 1, P(|T| >= 1) = 0.5
        assert!((correlation_p_value(0.5f64.sqrt(), 3) - 0.5).abs() < 1e-10);
        // n = 4 gives df = 2; r = 2/sqrt(6) maps to t = 2, p = 1 - t / sqrt(t^2 + 2)
        let t: f64 = 2.0;
        let expected = 1.0 - t / (t * t + 2.0).sqrt();
        assert!((correlation_p_value(2.0 / 6.0f64.sqrt(), 4) - expected).abs() < 1e-10);
        assert!((correlation_p_value(0.0, 7) - 1.0).abs() < 1e-12);
        assert!(correlation_p_value(0.3, 2).is_nan());
        assert!(correlation_p_value(f64::NAN, 10).is_nan());
    }

    #[test]
    fn ranks_are_stable_with_nan_present() {
        // NaN sorts above every number, whatever its position
        assert_eq!(ranks(&[f64::NAN, 2.0, 1.0]), vec![3.0, 2.0, 1.0]);
        assert_eq!(ranks(&[2.0, 1.0, f64::NAN]), vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn min_max_scales_columns_independently() {
        let m = array![[0.0, 10.0, 3.0], [5.0, 20.0, 3.0], [10.0, 30.0, 3.0]];
        let s = min_max_columns(m.view());
        assert_eq!(s.column(0).to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(s.column(1).to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(s.column(2).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn r2_score_reference_values() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        assert_eq!(r2_score(y.view(), y.view()), 1.0);
        let flat = array![2.5, 2.5, 2.5, 2.5];
        assert!(r2_score(y.view(), flat.view()).abs() < 1e-12);
        let c = array![1.0, 1.0];
        assert_eq!(r2_score(c.view(), array![1.0, 1.0].view()), 1.0);
        assert_eq!(r2_score(c.view(), array![1.0, 2.0].view()), 0.0);
    }
}
