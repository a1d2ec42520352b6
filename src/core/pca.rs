//! core/pca.rs - Principal component projection with a numerical noise floor.

use ndarray::{Array2, ArrayView2, Axis, s};
use rand::Rng;

use crate::core::linalg::symmetric_eigen;
use crate::error::Result;

#[derive(Clone, Copy, Debug)]
pub struct PcaParams {
    /// Upper bound on retained components; clamped to the data rank.
    pub n_components: usize,
    /// Uniform noise `[0, jitter)` added before centering.
    pub jitter: f64,
    pub max_sweeps: usize,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            n_components: 200,
            jitter: 1e-6,
            max_sweeps: 100,
        }
    }
}

/// Project `x` (samples x features) onto its leading principal components.
///
/// Works on the smaller of the two Gram matrices: the feature covariance when
/// there are fewer features than samples, the sample Gram matrix otherwise.
/// The input is never modified; jitter is applied to a private copy.
pub fn fit_transform<R: Rng + ?Sized>(
    x: ArrayView2<'_, f64>,
    params: &PcaParams,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let (n, d) = x.dim();
    let k = params.n_components.min(n).min(d);
    if k == 0 {
        return Ok(Array2::zeros((n, 0)));
    }

    let mut xc = x.to_owned();
    if params.jitter > 0.0 {
        xc.mapv_inplace(|v| v + rng.random::<f64>() * params.jitter);
    }
    if let Some(means) = xc.mean_axis(Axis(0)) {
        xc -= &means;
    }

    if d <= n {
        let cov = xc.t().dot(&xc);
        let eig = symmetric_eigen(cov.view(), params.max_sweeps)?;
        Ok(xc.dot(&eig.vectors.slice(s![.., ..k])))
    } else {
        let gram = xc.dot(&xc.t());
        let eig = symmetric_eigen(gram.view(), params.max_sweeps)?;
        let mut scores = eig.vectors.slice(s![.., ..k]).to_owned();
        for (mut col, &lambda) in scores.axis_iter_mut(Axis(1)).zip(eig.values.iter()) {
            let sigma = lambda.max(0.0).sqrt();
            col.mapv_inplace(|u| u * sigma);
        }
        Ok(scores)
    }
}
