//! rsa/dissimilarity.rs - Pairwise-distance matrices over stimulus representations.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CollusionError, Result};

/// Distance metrics, named as in scipy's `pdist`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    SqEuclidean,
    Cityblock,
    Cosine,
    Correlation,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Euclidean,
        Metric::SqEuclidean,
        Metric::Cityblock,
        Metric::Cosine,
        Metric::Correlation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::SqEuclidean => "sqeuclidean",
            Metric::Cityblock => "cityblock",
            Metric::Cosine => "cosine",
            Metric::Correlation => "correlation",
        }
    }

    pub fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            Metric::Euclidean => Metric::SqEuclidean.distance(a, b).sqrt(),
            Metric::SqEuclidean => a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum(),
            Metric::Cityblock => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Metric::Cosine => cosine_distance(a.iter().copied(), b.iter().copied(), a == b),
            Metric::Correlation => {
                let n = a.len().max(1) as f64;
                let ma = a.sum() / n;
                let mb = b.sum() / n;
                cosine_distance(
                    a.iter().map(|x| x - ma),
                    b.iter().map(|y| y - mb),
                    a == b,
                )
            }
        }
    }
}

/// `1 - cos(a, b)`. A zero-norm side gives 0 for identical inputs, 1 otherwise.
fn cosine_distance(
    a: impl Iterator<Item = f64>,
    b: impl Iterator<Item = f64>,
    identical: bool,
) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let den = (na * nb).sqrt();
    if den > 0.0 {
        (1.0 - dot / den).max(0.0)
    } else if identical {
        0.0
    } else {
        1.0
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = CollusionError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == lowered)
            .ok_or_else(|| {
                CollusionError::invalid(format!(
                    "unknown metric '{s}' (expected one of euclidean, sqeuclidean, cityblock, cosine, correlation)"
                ))
            })
    }
}

/// Square, symmetric, non-negative distance matrix with zero diagonal.
#[derive(Clone, Debug, PartialEq)]
pub struct DissimilarityMatrix(Array2<f64>);

impl DissimilarityMatrix {
    pub fn zeros(n: usize) -> Self {
        Self(Array2::zeros((n, n)))
    }

    /// Wrap a matrix read back from storage. Only squareness is checked:
    /// stored grids are rounded, so exact symmetry is not guaranteed.
    pub fn from_stored(m: Array2<f64>) -> Result<Self> {
        if m.nrows() != m.ncols() {
            return Err(CollusionError::alignment(format!(
                "dissimilarity matrix must be square, got {}x{}",
                m.nrows(),
                m.ncols()
            )));
        }
        Ok(Self(m))
    }

    pub fn len(&self) -> usize {
        self.0.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.0.nrows() == 0
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.0
    }
}

/// Pairwise distances between the rows of `matrix`.
///
/// The upper triangle is computed and mirrored. A matrix with no columns
/// yields an all-zero result; a single column is always scored Euclidean.
pub fn compute(matrix: &Array2<f64>, metric: Metric) -> DissimilarityMatrix {
    let n = matrix.nrows();
    match matrix.ncols() {
        0 => return DissimilarityMatrix::zeros(n),
        1 => {
            if metric != Metric::Euclidean {
                debug!(%metric, "single feature per stimulus, using euclidean");
            }
            return compute_scalar(matrix.column(0));
        }
        _ => {}
    }
    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        let a = matrix.row(i);
        for j in (i + 1)..n {
            let d = metric.distance(a, matrix.row(j));
            out[[i, j]] = d;
            out[[j, i]] = d;
        }
    }
    DissimilarityMatrix(out)
}

/// Distances between scalar responses; always Euclidean (`|a - b|`).
pub fn compute_scalar(values: ArrayView1<'_, f64>) -> DissimilarityMatrix {
    let n = values.len();
    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = (values[i] - values[j]).abs();
            out[[i, j]] = d;
            out[[j, i]] = d;
        }
    }
    DissimilarityMatrix(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn metric_names_round_trip() {
        for m in Metric::ALL {
            assert_eq!(m.name().parse::<Metric>().unwrap(), m);
        }
        assert_eq!("Correlation".parse::<Metric>().unwrap(), Metric::Correlation);
        assert!("manhattan".parse::<Metric>().is_err());
    }

    #[test]
    fn reference_distances() {
        let a = array![1.0, 0.0, 0.0];
        let b = array![0.0, 1.0, 0.0];
        let c = array![2.0, 0.0, 0.0];
        assert!((Metric::Euclidean.distance(a.view(), b.view()) - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(Metric::SqEuclidean.distance(a.view(), b.view()), 2.0);
        assert_eq!(Metric::Cityblock.distance(a.view(), b.view()), 2.0);
        assert!((Metric::Cosine.distance(a.view(), b.view()) - 1.0).abs() < 1e-12);
        assert!(Metric::Cosine.distance(a.view(), c.view()).abs() < 1e-12);

        let x = array![1.0, 2.0, 3.0];
        let y = array![3.0, 2.0, 1.0];
        assert!((Metric::Correlation.distance(x.view(), y.view()) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constant_rows_never_produce_nan() {
        let m = array![[1.0, 1.0], [1.0, 1.0], [0.0, 0.0]];
        for metric in Metric::ALL {
            let d = compute(&m, metric);
            assert!(d.as_array().iter().all(|v| v.is_finite()), "{metric}");
            assert_eq!(d.as_array()[[0, 1]], 0.0, "{metric}");
        }
    }

    #[test]
    fn scalar_distances_are_absolute_differences() {
        let d = compute_scalar(array![5.0, 3.0, 7.0].view());
        assert_eq!(
            d.as_array(),
            &array![[0.0, 2.0, 2.0], [2.0, 0.0, 4.0], [2.0, 4.0, 0.0]]
        );
    }

    #[test]
    fn stored_matrix_must_be_square() {
        assert!(DissimilarityMatrix::from_stored(Array2::zeros((2, 3))).is_err());
        assert_eq!(
            DissimilarityMatrix::from_stored(Array2::zeros((3, 3))).unwrap(),
            DissimilarityMatrix::zeros(3)
        );
    }
}
