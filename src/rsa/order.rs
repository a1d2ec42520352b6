//! rsa/order.rs - Category reordering and permutation of stimulus rows.
//!
//! Ordering contract: category reorder first, optional shuffle second,
//! dissimilarity computation last. Every operation returns a new matrix.

use std::collections::HashMap;

use ndarray::{Array2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{CollusionError, Result};

/// Row orders that bring stimulation-ordered and model-ordered data into
/// the shared category order.
#[derive(Clone, Debug, Default)]
pub struct StimulusOrderer {
    stimulation_to_categories: Vec<usize>,
    model_to_categories: Vec<usize>,
}

impl StimulusOrderer {
    /// `stimulation` is the presentation sequence (repeats allowed);
    /// `model` lists the stimuli in the order the model saw them.
    pub fn from_sequences(stimulation: &[String], model: &[String]) -> Self {
        let stimulation_to_categories = category_order(stimulation);

        let mut model_positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, id) in model.iter().enumerate() {
            model_positions.entry(id.as_str()).or_default().push(i);
        }
        let mut sorted: Vec<&str> = stimulation.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let model_to_categories = sorted
            .iter()
            .flat_map(|id| model_positions.get(id).into_iter().flatten().copied())
            .collect();

        Self {
            stimulation_to_categories,
            model_to_categories,
        }
    }

    pub fn stimulation_order(&self) -> &[usize] {
        &self.stimulation_to_categories
    }

    pub fn model_order(&self) -> &[usize] {
        &self.model_to_categories
    }
}

/// Indices of `ids` grouped by sorted id; positions ascend within a group.
pub fn category_order(ids: &[String]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ids.len()).collect();
    order.sort_by(|&a, &b| ids[a].cmp(&ids[b]).then(a.cmp(&b)));
    order
}

/// Select rows of `matrix` in `order`.
pub fn reorder(matrix: &Array2<f64>, order: &[usize]) -> Result<Array2<f64>> {
    if let Some(&bad) = order.iter().find(|&&i| i >= matrix.nrows()) {
        return Err(CollusionError::alignment(format!(
            "reorder index {bad} out of range for {} rows",
            matrix.nrows()
        )));
    }
    Ok(matrix.select(Axis(0), order))
}

/// Uniformly random row permutation.
pub fn shuffle<R: Rng + ?Sized>(matrix: &Array2<f64>, rng: &mut R) -> Array2<f64> {
    let mut order: Vec<usize> = (0..matrix.nrows()).collect();
    order.shuffle(rng);
    matrix.select(Axis(0), &order)
}
