//! mapping/alpha.rs - Coarse-to-fine search for the ridge penalty.

use ndarray::{ArrayView1, ArrayView2};

use crate::core::ridge::CrossValidation;
use crate::error::Result;

/// Coarse candidates: 0, then 1e-4 through 1e15 by decades.
pub const COARSE_ALPHAS: [f64; 21] = [
    0.0, 1e-4, 1e-3, 1e-2, 1e-1, 1.0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10,
    1e11, 1e12, 1e13, 1e14, 1e15,
];

/// Points in the refined grid between the coarse optimum's neighbours.
pub const REFINE_STEPS: usize = 50;

/// Outcome of the two-stage search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlphaSearch {
    pub coarse: f64,
    pub refined: f64,
}

/// Candidate with the highest mean cross-validated R².
///
/// Starts from alpha 1.0 at score -1.0 and accepts ties, so the last of
/// equally scoring candidates wins. A candidate that never beats -1.0 leaves
/// the result at 1.0.
pub fn scan(candidates: &[f64], cv: &CrossValidation) -> f64 {
    let mut best_alpha = 1.0;
    let mut max_r2 = -1.0;
    for &alpha in candidates {
        let r2 = cv.score(alpha);
        if r2 >= max_r2 {
            best_alpha = alpha;
            max_r2 = r2;
        }
    }
    best_alpha
}

/// Linear grid spanning the neighbours of `best` in `coarse`.
///
/// The range is `[from, to)` in `REFINE_STEPS` even steps; neighbours are
/// clamped at the ends of the grid. When `best` is not a member of `coarse`
/// (the scan fell back to its initial value) the grid is centered on the
/// nearest member instead. A degenerate range yields the single point `from`.
pub fn refine_grid(coarse: &[f64], best: f64) -> Vec<f64> {
    if coarse.is_empty() {
        return vec![best];
    }
    let idx = coarse.iter().position(|&a| a == best).unwrap_or_else(|| {
        coarse
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - best)
                    .abs()
                    .partial_cmp(&(*b - best).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    });
    let from = coarse[idx.saturating_sub(1)];
    let to = coarse[(idx + 1).min(coarse.len() - 1)];
    if to <= from {
        return vec![from];
    }
    let step = (to - from) / REFINE_STEPS as f64;
    (0..REFINE_STEPS).map(|i| from + i as f64 * step).collect()
}

/// Coarse scan over `coarse`, then a refined scan around its optimum.
pub fn search_with(coarse: &[f64], cv: &CrossValidation) -> AlphaSearch {
    let coarse_best = scan(coarse, cv);
    let refined = scan(&refine_grid(coarse, coarse_best), cv);
    AlphaSearch {
        coarse: coarse_best,
        refined,
    }
}

/// Two-stage search on `(x, y)` with `folds`-fold cross-validation.
pub fn search(
    candidates: &[f64],
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    folds: usize,
) -> Result<AlphaSearch> {
    let cv = CrossValidation::new(x, y, folds)?;
    Ok(search_with(candidates, &cv))
}
