//! rsa/permutation.rs - Permutation null distribution for a single probe-layer score.

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::core::stats::nan_to_zero;
use crate::error::Result;
use crate::rsa::dissimilarity::{DissimilarityMatrix, compute_scalar};
use crate::rsa::scorer::{Scope, score};

/// Null scores are never gated.
pub const NULL_THRESHOLD: f64 = 1.0;

/// Score `layer` against `n_perm` row permutations of `probe`.
pub fn collect_null<R: Rng + ?Sized>(
    layer: &DissimilarityMatrix,
    probe: ArrayView1<'_, f64>,
    n_perm: usize,
    scope: Scope,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let mut values: Vec<f64> = probe.to_vec();
    let mut null = Vec::with_capacity(n_perm);
    for _ in 0..n_perm {
        values.shuffle(rng);
        let rdm = compute_scalar(Array1::from_vec(values.clone()).view());
        null.push(nan_to_zero(score(layer, &rdm, scope, NULL_THRESHOLD)?));
    }
    Ok(null)
}

/// `(#{null >= observed} + 1) / (n + 1)`; never zero.
pub fn empirical_p(observed: f64, null: &[f64]) -> f64 {
    let exceed = null.iter().filter(|&&v| v >= observed).count();
    (exceed + 1) as f64 / (null.len() + 1) as f64
}
