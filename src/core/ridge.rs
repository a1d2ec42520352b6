//! core/ridge.rs - L2-regularized linear regression and k-fold cross-validation.
//!
//! Folds are contiguous and unshuffled: the first `n % k` folds hold one extra
//! sample. Randomizing fold membership is the caller's job (row permutation).

use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::core::linalg::cholesky_solve;
use crate::core::stats::r2_score;
use crate::error::{CollusionError, Result};

/// Fitted ridge model with intercept.
#[derive(Clone, Debug)]
pub struct RidgeModel {
    pub coef: Array1<f64>,
    pub intercept: f64,
}

impl RidgeModel {
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, alpha: f64) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(CollusionError::alignment(format!(
                "ridge fit: {} feature rows vs {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(CollusionError::invalid("ridge fit on zero samples"));
        }
        let normal = NormalEquations::new(x, y);
        Ok(normal.solve(alpha))
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }
}

/// Centered normal equations of one training set, reusable across alphas.
#[derive(Clone, Debug)]
struct NormalEquations {
    gram: Array2<f64>,
    xty: Array1<f64>,
    x_mean: Array1<f64>,
    y_mean: f64,
}

impl NormalEquations {
    fn new(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Self {
        let n = x.nrows() as f64;
        let x_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.sum() / n;
        let xc = &x - &x_mean;
        let yc = y.mapv(|v| v - y_mean);
        Self {
            gram: xc.t().dot(&xc),
            xty: xc.t().dot(&yc),
            x_mean,
            y_mean,
        }
    }

    fn solve(&self, alpha: f64) -> RidgeModel {
        let mut a = self.gram.clone();
        for i in 0..a.nrows() {
            a[[i, i]] += alpha;
        }
        let coef = cholesky_solve(a.view(), self.xty.view());
        let intercept = self.y_mean - self.x_mean.dot(&coef);
        RidgeModel { coef, intercept }
    }
}

/// Contiguous test ranges for k-fold splitting of `n` samples.
pub fn kfold_ranges(n: usize, k: usize) -> Result<Vec<Range<usize>>> {
    if k < 2 || k > n {
        return Err(CollusionError::invalid(format!(
            "cannot split {n} samples into {k} folds"
        )));
    }
    let base = n / k;
    let extra = n % k;
    let mut ranges = Vec::with_capacity(k);
    let mut start = 0usize;
    for fold in 0..k {
        let len = base + usize::from(fold < extra);
        ranges.push(start..start + len);
        start += len;
    }
    Ok(ranges)
}

struct Fold {
    test: Range<usize>,
    normal: NormalEquations,
}

/// k-fold cross-validation over a fixed dataset.
///
/// Training-set normal equations are computed once, so scanning many alphas
/// only costs one solve per fold per alpha.
pub struct CrossValidation {
    x: Array2<f64>,
    y: Array1<f64>,
    folds: Vec<Fold>,
}

impl CrossValidation {
    pub fn new(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, k: usize) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(CollusionError::alignment(format!(
                "cross-validation: {} feature rows vs {} targets",
                x.nrows(),
                y.len()
            )));
        }
        let n = y.len();
        let folds = kfold_ranges(n, k)?
            .into_iter()
            .map(|test| {
                let train: Vec<usize> = (0..n).filter(|i| !test.contains(i)).collect();
                let x_train = x.select(Axis(0), &train);
                let y_train = y.select(Axis(0), &train);
                Fold {
                    test,
                    normal: NormalEquations::new(x_train.view(), y_train.view()),
                }
            })
            .collect();
        Ok(Self {
            x: x.to_owned(),
            y: y.to_owned(),
            folds,
        })
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Held-out R² per fold.
    pub fn fold_scores(&self, alpha: f64) -> Vec<f64> {
        self.folds
            .iter()
            .map(|fold| {
                let model = fold.normal.solve(alpha);
                let x_test = self.x.slice(ndarray::s![fold.test.clone(), ..]);
                let y_test = self.y.slice(ndarray::s![fold.test.clone()]);
                r2_score(y_test, model.predict(x_test).view())
            })
            .collect()
    }

    /// Mean held-out R².
    pub fn score(&self, alpha: f64) -> f64 {
        let scores = self.fold_scores(alpha);
        scores.iter().sum::<f64>() / scores.len() as f64
    }

    /// Out-of-fold prediction for every sample.
    pub fn predict(&self, alpha: f64) -> Array1<f64> {
        let mut out = Array1::<f64>::zeros(self.y.len());
        for fold in &self.folds {
            let model = fold.normal.solve(alpha);
            let x_test = self.x.slice(ndarray::s![fold.test.clone(), ..]);
            out.slice_mut(ndarray::s![fold.test.clone()])
                .assign(&model.predict(x_test));
        }
        out
    }
}
