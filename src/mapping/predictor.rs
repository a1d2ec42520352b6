//! mapping/predictor.rs - Cross-validated predictability of one probe from one layer.
//!
//! Per task: drop rejected observations, reduce the layer with PCA, pick the
//! ridge penalty, then repeat shuffled k-fold prediction and score each run by
//! the Spearman correlation of predicted against measured responses.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::config::RegressionConfig;
use crate::core::pca::{self, PcaParams};
use crate::core::ridge::CrossValidation;
use crate::core::stats::{Correlation, mean, nan_to_zero, spearman_views};
use crate::error::{CollusionError, Result};
use crate::mapping::alpha::{self, COARSE_ALPHAS};
use crate::store::POISON_PILL;

/// Keep only rows whose response is not the poison pill.
pub fn filter_poison_pill(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<(Array2<f64>, Array1<f64>)> {
    if x.nrows() != y.len() {
        return Err(CollusionError::alignment(format!(
            "{} activation rows vs {} probe responses",
            x.nrows(),
            y.len()
        )));
    }
    let keep: Vec<usize> = y
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v != POISON_PILL)
        .map(|(i, _)| i)
        .collect();
    Ok((x.select(Axis(0), &keep), y.select(Axis(0), &keep)))
}

/// A run counts only when positive and significant.
pub fn gate_trial(c: Correlation, significance: f64) -> f64 {
    if c.p > significance || c.r < 0.0 {
        0.0
    } else {
        nan_to_zero(c.r)
    }
}

/// Result of one (layer, probe) task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskOutcome {
    pub layer: String,
    pub layer_idx: usize,
    pub probe: usize,
    pub trial_scores: Vec<f64>,
    /// Mean of `trial_scores`.
    pub score: f64,
    pub skipped: bool,
    /// Refined penalty; `None` when skipped.
    pub alpha: Option<f64>,
}

impl TaskOutcome {
    fn skipped(layer: &str, layer_idx: usize, probe: usize, n_runs: usize) -> Self {
        Self {
            layer: layer.to_string(),
            layer_idx,
            probe,
            trial_scores: vec![0.0; n_runs],
            score: 0.0,
            skipped: true,
            alpha: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProbeLayerPredictor {
    params: RegressionConfig,
}

impl ProbeLayerPredictor {
    pub fn new(params: &RegressionConfig) -> Self {
        Self {
            params: params.clone(),
        }
    }

    pub fn params(&self) -> &RegressionConfig {
        &self.params
    }

    /// Score how well `layer` activations `x` predict probe responses `y`.
    ///
    /// Convergence failures and datasets too small to cross-validate skip the
    /// task with zero scores; alignment problems are returned as errors.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        layer: &str,
        layer_idx: usize,
        probe: usize,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rng: &mut R,
    ) -> Result<TaskOutcome> {
        let (x, mut y) = filter_poison_pill(x, y)?;
        if self.params.permute_responses {
            let mut values = y.to_vec();
            values.shuffle(rng);
            y = Array1::from_vec(values);
        }

        match self.fit_and_score(x, y, rng) {
            Ok((alpha, trial_scores)) => {
                let score = nan_to_zero(mean(&trial_scores));
                debug!(layer, probe, alpha, ?trial_scores, "task done");
                Ok(TaskOutcome {
                    layer: layer.to_string(),
                    layer_idx,
                    probe,
                    trial_scores,
                    score,
                    skipped: false,
                    alpha: Some(alpha),
                })
            }
            Err(err) if err.is_task_recoverable() => {
                warn!(layer, probe, %err, "skipping probe");
                Ok(TaskOutcome::skipped(layer, layer_idx, probe, self.params.n_runs))
            }
            Err(err) => Err(err),
        }
    }

    fn fit_and_score<R: Rng + ?Sized>(
        &self,
        x: Array2<f64>,
        y: Array1<f64>,
        rng: &mut R,
    ) -> Result<(f64, Vec<f64>)> {
        let pca_params = PcaParams {
            n_components: self.params.n_components,
            jitter: self.params.jitter,
            max_sweeps: self.params.max_eigen_sweeps,
        };
        let mut z = pca::fit_transform(x.view(), &pca_params, rng)?;
        let mut y = y;
        let search = alpha::search(&COARSE_ALPHAS, z.view(), y.view(), self.params.n_folds)?;

        let mut trials = Vec::with_capacity(self.params.n_runs);
        let mut order: Vec<usize> = (0..y.len()).collect();
        for _ in 0..self.params.n_runs {
            // reshuffle so every run sees different folds
            order.shuffle(rng);
            z = z.select(Axis(0), &order);
            y = y.select(Axis(0), &order);

            let cv = CrossValidation::new(z.view(), y.view(), self.params.n_folds)?;
            let predicted = cv.predict(search.refined);
            let c = spearman_views(y.view(), predicted.view());
            trials.push(gate_trial(c, self.params.significance));
        }
        Ok((search.refined, trials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_config() -> RegressionConfig {
        RegressionConfig {
            n_runs: 3,
            n_folds: 5,
            n_components: 4,
            ..RegressionConfig::default()
        }
    }

    #[test]
    fn poison_pill_rows_are_dropped_in_lock_step() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![5.0, POISON_PILL, 3.0, 7.0];
        let (fx, fy) = filter_poison_pill(x.view(), y.view()).unwrap();
        assert_eq!(fy, array![5.0, 3.0, 7.0]);
        assert_eq!(fx, array![[1.0, 1.0], [3.0, 3.0], [4.0, 4.0]]);
    }

    #[test]
    fn row_mismatch_is_an_error_not_a_skip() {
        let predictor = ProbeLayerPredictor::new(&small_config());
        let x = Array2::<f64>::zeros((4, 2));
        let y = Array1::<f64>::zeros(3);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            predictor.predict("conv1", 1, 0, x.view(), y.view(), &mut rng),
            Err(CollusionError::DataAlignment(_))
        ));
    }

    #[test]
    fn too_few_samples_skip_with_zeros() {
        let predictor = ProbeLayerPredictor::new(&small_config());
        let x = Array2::from_shape_fn((3, 2), |(i, j)| (i + j) as f64);
        let y = array![1.0, 2.0, 3.0];
        let mut rng = StdRng::seed_from_u64(0);
        let out = predictor
            .predict("fc6", 6, 2, x.view(), y.view(), &mut rng)
            .unwrap();
        assert!(out.skipped);
        assert_eq!(out.trial_scores, vec![0.0; 3]);
        assert_eq!(out.score, 0.0);
        assert_eq!(out.alpha, None);
    }

    #[test]
    fn gate_drops_negative_and_insignificant_runs() {
        assert_eq!(gate_trial(Correlation { r: 0.9, p: 1e-6 }, 1e-4), 0.9);
        assert_eq!(gate_trial(Correlation { r: 0.9, p: 1e-3 }, 1e-4), 0.0);
        assert_eq!(gate_trial(Correlation { r: -0.9, p: 1e-9 }, 1e-4), 0.0);
        assert_eq!(gate_trial(Correlation::UNDEFINED, 1e-4), 0.0);
    }

    #[test]
    fn linear_probe_is_predictable() {
        let n = 60;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| ((i * (j + 3)) % 17) as f64 + j as f64);
        let y = Array1::from_shape_fn(n, |i| x[[i, 0]] * 2.0 + x[[i, 2]]);
        let predictor = ProbeLayerPredictor::new(&small_config());
        let mut rng = StdRng::seed_from_u64(11);
        let out = predictor
            .predict("conv2", 2, 0, x.view(), y.view(), &mut rng)
            .unwrap();
        assert!(!out.skipped);
        assert_eq!(out.trial_scores.len(), 3);
        assert!(out.score > 0.9, "score {}", out.score);
    }
}
