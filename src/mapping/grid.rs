//! mapping/grid.rs - Fixed worker pool over the (layer, probe) task grid.
//!
//! Workers pull tasks from a shared queue and send outcomes back over a
//! channel; the score matrix is only assembled after every worker has joined.
//! Each task carries its own seed, so outcomes do not depend on which worker
//! ran it or in what order.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::RegressionConfig;
use crate::core::stats::nan_to_zero;
use crate::error::{CollusionError, Result};
use crate::mapping::predictor::{ProbeLayerPredictor, TaskOutcome};

/// One (layer, probe) unit of work.
#[derive(Clone, Debug)]
pub struct Task {
    pub layer: String,
    pub layer_idx: usize,
    pub probe: usize,
    /// Shared, read-only layer activations (stimuli x features).
    pub activity: Arc<Array2<f64>>,
    pub responses: Array1<f64>,
    pub seed: Option<u64>,
}

impl Task {
    /// Seeded generator for this task, or fresh entropy when unseeded.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

/// Mix the run seed with the task coordinates.
pub fn task_seed(seed: u64, layer_idx: usize, probe: usize) -> u64 {
    seed ^ (layer_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (probe as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Every (layer, probe) pair; layers outer, probes inner.
pub fn build_tasks(
    layers: &[(String, Arc<Array2<f64>>)],
    responses: &Array2<f64>,
    seed: Option<u64>,
) -> Result<Vec<Task>> {
    let mut tasks = Vec::with_capacity(layers.len() * responses.ncols());
    for (layer_idx, (layer, activity)) in layers.iter().enumerate() {
        if activity.nrows() != responses.nrows() {
            return Err(CollusionError::alignment(format!(
                "layer {layer}: {} activation rows vs {} response rows",
                activity.nrows(),
                responses.nrows()
            )));
        }
        for probe in 0..responses.ncols() {
            tasks.push(Task {
                layer: layer.clone(),
                layer_idx,
                probe,
                activity: Arc::clone(activity),
                responses: responses.column(probe).to_owned(),
                seed: seed.map(|s| task_seed(s, layer_idx, probe)),
            });
        }
    }
    Ok(tasks)
}

/// Outcomes keyed by `(layer_idx, probe)`.
pub type GridResults = HashMap<(usize, usize), TaskOutcome>;

#[derive(Clone, Copy, Debug)]
pub struct ParallelGridExecutor {
    workers: usize,
}

impl ParallelGridExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run the probe-layer predictor over all tasks.
    pub fn run(&self, tasks: Vec<Task>, params: &RegressionConfig) -> Result<GridResults> {
        let predictor = ProbeLayerPredictor::new(params);
        self.run_with(tasks, |task| {
            let mut rng = task.rng();
            predictor.predict(
                &task.layer,
                task.layer_idx,
                task.probe,
                task.activity.view(),
                task.responses.view(),
                &mut rng,
            )
        })
    }

    /// Run `work` over all tasks. The first error returned by any task is
    /// reported after the pool has drained.
    pub fn run_with<F>(&self, tasks: Vec<Task>, work: F) -> Result<GridResults>
    where
        F: Fn(&Task) -> Result<TaskOutcome> + Sync,
    {
        let total = tasks.len();
        let workers = self.workers.min(total.max(1));
        info!(tasks = total, workers, "running task grid");

        let (task_tx, task_rx) = unbounded::<Task>();
        let (result_tx, result_rx) = unbounded::<Result<TaskOutcome>>();
        for task in tasks {
            // receiver is alive until the scope below ends
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        thread::scope(|s| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let work = &work;
                s.spawn(move || {
                    while let Ok(task) = task_rx.recv() {
                        if result_tx.send(work(&task)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut results = GridResults::with_capacity(total);
        let mut first_err = None;
        for outcome in result_rx.iter() {
            match outcome {
                Ok(outcome) => {
                    debug!(
                        done = results.len() + 1,
                        total,
                        layer = %outcome.layer,
                        probe = outcome.probe,
                        "task finished"
                    );
                    results.insert((outcome.layer_idx, outcome.probe), outcome);
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}

/// Score matrix with rows = probes, columns = layers. Missing cells stay 0.
pub fn aggregate(results: &GridResults, n_probes: usize, n_layers: usize) -> Array2<f64> {
    let mut scores = Array2::<f64>::zeros((n_probes, n_layers));
    for (&(layer_idx, probe), outcome) in results {
        if layer_idx < n_layers && probe < n_probes {
            scores[[probe, layer_idx]] = nan_to_zero(outcome.score);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(layer_idx: usize, probe: usize, score: f64) -> TaskOutcome {
        TaskOutcome {
            layer: format!("l{layer_idx}"),
            layer_idx,
            probe,
            trial_scores: vec![score],
            score,
            skipped: false,
            alpha: Some(1.0),
        }
    }

    fn toy_tasks(n_layers: usize, n_probes: usize) -> Vec<Task> {
        let layers: Vec<(String, Arc<Array2<f64>>)> = (0..n_layers)
            .map(|l| (format!("l{l}"), Arc::new(Array2::from_elem((4, 2), l as f64))))
            .collect();
        let responses = Array2::<f64>::zeros((4, n_probes));
        build_tasks(&layers, &responses, Some(9)).unwrap()
    }

    #[test]
    fn seeds_differ_per_cell() {
        let a = task_seed(1, 0, 1);
        let b = task_seed(1, 1, 0);
        let c = task_seed(1, 1, 1);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a, task_seed(1, 0, 1));
    }

    #[test]
    fn build_tasks_covers_grid_and_checks_rows() {
        let tasks = toy_tasks(3, 5);
        assert_eq!(tasks.len(), 15);
        assert_eq!((tasks[7].layer_idx, tasks[7].probe), (1, 2));

        let bad = vec![("l0".to_string(), Arc::new(Array2::<f64>::zeros((3, 2))))];
        assert!(build_tasks(&bad, &Array2::zeros((4, 1)), None).is_err());
    }

    #[test]
    fn run_with_collects_every_task() {
        let tasks = toy_tasks(2, 3);
        let results = ParallelGridExecutor::new(4)
            .run_with(tasks, |t| Ok(outcome(t.layer_idx, t.probe, t.probe as f64 * 0.1)))
            .unwrap();
        assert_eq!(results.len(), 6);
        let scores = aggregate(&results, 3, 2);
        assert_eq!(scores[[2, 1]], 0.2);
    }

    #[test]
    fn task_errors_surface_after_drain() {
        let tasks = toy_tasks(1, 4);
        let err = ParallelGridExecutor::new(2)
            .run_with(tasks, |t| {
                if t.probe == 2 {
                    Err(CollusionError::alignment("probe 2"))
                } else {
                    Ok(outcome(t.layer_idx, t.probe, 0.5))
                }
            })
            .unwrap_err();
        assert!(matches!(err, CollusionError::DataAlignment(_)));
    }

    #[test]
    fn aggregate_canonicalizes_nan() {
        let mut results = GridResults::new();
        results.insert((0, 0), outcome(0, 0, f64::NAN));
        results.insert((1, 0), outcome(1, 0, 0.3));
        let scores = aggregate(&results, 1, 2);
        assert_eq!(scores[[0, 0]], 0.0);
        assert_eq!(scores[[0, 1]], 0.3);
    }
}
