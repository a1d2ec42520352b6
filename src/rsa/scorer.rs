//! rsa/scorer.rs - Rank-correlation similarity between dissimilarity matrices.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::stats::{Correlation, min_max_columns, nan_to_zero, spearman, spearman_views};
use crate::error::{CollusionError, Result};
use crate::rsa::dissimilarity::DissimilarityMatrix;

/// Whether to correlate whole matrices or row by row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One correlation over the flattened matrices.
    Matrix,
    /// One correlation per stimulus row, averaged.
    Image,
}

impl Scope {
    pub fn name(&self) -> &'static str {
        match self {
            Scope::Matrix => "matrix",
            Scope::Image => "image",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = CollusionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "matrix" => Ok(Scope::Matrix),
            "image" => Ok(Scope::Image),
            other => Err(CollusionError::invalid(format!(
                "unknown scope '{other}' (expected matrix or image)"
            ))),
        }
    }
}

/// Contribution of one correlation under a significance threshold.
///
/// Below 1.0 only positive, significant correlations count; at 1.0 and above
/// every correlation passes through unfiltered.
pub fn gate(c: Correlation, threshold: f64) -> f64 {
    if threshold >= 1.0 {
        return c.r;
    }
    if c.r > 0.0 && c.p <= threshold {
        c.r
    } else {
        0.0
    }
}

/// Similarity of two dissimilarity matrices.
///
/// Both inputs are min-max rescaled column-wise first. The result can be NaN
/// when an input is constant; `score_grid` canonicalizes that to 0.0.
pub fn score(
    a: &DissimilarityMatrix,
    b: &DissimilarityMatrix,
    scope: Scope,
    threshold: f64,
) -> Result<f64> {
    if a.len() != b.len() {
        return Err(CollusionError::alignment(format!(
            "dissimilarity matrices cover different stimulus sets ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    let sa = min_max_columns(a.as_array().view());
    let sb = min_max_columns(b.as_array().view());

    match scope {
        Scope::Matrix => {
            let fa: Vec<f64> = sa.iter().copied().collect();
            let fb: Vec<f64> = sb.iter().copied().collect();
            Ok(gate(spearman(&fa, &fb), threshold))
        }
        Scope::Image => {
            let nrows = sa.nrows();
            if nrows == 0 {
                return Ok(f64::NAN);
            }
            let total: f64 = sa
                .axis_iter(Axis(0))
                .zip(sb.axis_iter(Axis(0)))
                .map(|(ra, rb)| gate(spearman_views(ra, rb), threshold))
                .sum();
            Ok(total / nrows as f64)
        }
    }
}

/// Score every (probe, layer) pair: rows follow `probes`, columns `layers`.
pub fn score_grid(
    layers: &[(String, DissimilarityMatrix)],
    probes: &[DissimilarityMatrix],
    scope: Scope,
    threshold: f64,
) -> Result<Array2<f64>> {
    let mut scores = Array2::<f64>::zeros((probes.len(), layers.len()));
    for (lid, (layer, layer_rdm)) in layers.iter().enumerate() {
        for (pid, probe_rdm) in probes.iter().enumerate() {
            let raw = score(layer_rdm, probe_rdm, scope, threshold)?;
            if raw.is_nan() {
                debug!(layer = %layer, probe = pid, "degenerate correlation input, score set to 0");
            }
            scores[[pid, lid]] = nan_to_zero(raw);
        }
    }
    Ok(scores)
}

/// Directory suffix for a threshold: digits after the decimal point with
/// trailing zeros removed (`0.01` -> `01`, `1.0` -> ``).
pub fn threshold_tag(threshold: f64) -> String {
    let formatted = format!("{threshold:.10}");
    let fraction = formatted.split_once('.').map(|(_, f)| f).unwrap_or("");
    fraction.trim_end_matches('0').to_string()
}
