//! synthetic.rs - Sanity-check datasets with a known probe-to-layer assignment.
//!
//! Probes are split into contiguous blocks, one block per layer. Every probe
//! in a block responds to the same fixed linear read-out of that layer plus
//! independent noise, so a working mapping pipeline should recover the block
//! structure (`000111222...`) in its score matrix.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::seq::index;
use tracing::info;

use crate::error::{CollusionError, Result};
use crate::rsa::source::PixelSource;
use crate::store::write_grid;

/// Weights drawn from the strong range; the rest are near zero.
pub const STRONG_WEIGHTS: usize = 30;

#[derive(Clone, Debug)]
pub struct SyntheticSubject {
    /// Stimuli x probes.
    pub responses: Array2<f64>,
    /// Layer index driving each probe.
    pub assignment: Vec<usize>,
}

/// Responses for `n_probes` probes driven by `layers` (row-aligned).
pub fn generate<R: Rng + ?Sized>(
    layers: &[(String, Array2<f64>)],
    n_probes: usize,
    rng: &mut R,
) -> Result<SyntheticSubject> {
    let Some((_, first)) = layers.first() else {
        return Err(CollusionError::invalid("synthetic data needs at least one layer"));
    };
    let n_stimuli = first.nrows();
    if let Some((name, _)) = layers.iter().find(|(_, m)| m.nrows() != n_stimuli) {
        return Err(CollusionError::alignment(format!(
            "layer {name} does not have {n_stimuli} stimulus rows"
        )));
    }

    let mut responses = Array2::<f64>::zeros((n_stimuli, n_probes));
    let mut assignment = vec![0usize; n_probes];
    let per_layer = (n_probes / layers.len()).max(1);
    for (lid, (_, activity)) in layers.iter().enumerate() {
        let start = lid * per_layer;
        if start >= n_probes {
            break;
        }
        let end = if lid + 1 == layers.len() {
            n_probes
        } else {
            (start + per_layer).min(n_probes)
        };

        let weights = readout_weights(activity.ncols(), rng);
        let signal = standardize(activity.dot(&weights).view());
        for probe in start..end {
            assignment[probe] = lid;
            let mut col = responses.column_mut(probe);
            for (dst, &s) in col.iter_mut().zip(signal.iter()) {
                *dst = s + rng.random_range(-0.5..0.5);
            }
        }
    }
    Ok(SyntheticSubject {
        responses,
        assignment,
    })
}

/// `d` weights in `[5, 10)`, all but `STRONG_WEIGHTS` of them (index 0
/// always kept) then redrawn from `[-0.5, 0.5)`.
fn readout_weights<R: Rng + ?Sized>(d: usize, rng: &mut R) -> Array1<f64> {
    let mut weights = Array1::from_shape_fn(d, |_| rng.random_range(5.0..10.0));
    if d > STRONG_WEIGHTS {
        for i in index::sample(rng, d - 1, d - STRONG_WEIGHTS) {
            weights[i + 1] = rng.random_range(-0.5..0.5);
        }
    }
    weights
}

/// Zero mean, unit population variance; a constant input is only centered.
fn standardize(v: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = v.len().max(1) as f64;
    let mean = v.sum() / n;
    let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    let scale = if var > 0.0 { var.sqrt() } else { 1.0 };
    v.mapv(|x| (x - mean) / scale)
}

/// Shape of a fully synthetic data directory.
#[derive(Clone, Debug)]
pub struct DatasetShape {
    pub stimuli: usize,
    pub probes: usize,
    /// Network layers; pixels come on top as layer 0.
    pub layers: usize,
    pub width: usize,
}

#[derive(Clone, Debug)]
pub struct SyntheticDataset {
    pub stimuli: Vec<String>,
    pub network: String,
    /// Pixels first, then the network layers.
    pub layers: Vec<(String, Array2<f64>)>,
    pub subject_name: String,
    pub subject: SyntheticSubject,
}

/// Random activations in `[0, 1)` and a subject generated from them.
pub fn random_dataset<R: Rng + ?Sized>(shape: &DatasetShape, rng: &mut R) -> Result<SyntheticDataset> {
    let stimuli: Vec<String> = (0..shape.stimuli).map(|i| format!("stim{i:03}")).collect();
    let mut layers = Vec::with_capacity(shape.layers + 1);
    layers.push((
        PixelSource::LABEL.to_string(),
        Array2::from_shape_fn((shape.stimuli, shape.width), |_| rng.random::<f64>()),
    ));
    for l in 0..shape.layers {
        layers.push((
            format!("layer{}", l + 1),
            Array2::from_shape_fn((shape.stimuli, shape.width), |_| rng.random::<f64>()),
        ));
    }
    let subject = generate(&layers, shape.probes, rng)?;
    Ok(SyntheticDataset {
        stimuli,
        network: "synthetic".to_string(),
        layers,
        subject_name: "synthetic01".to_string(),
        subject,
    })
}

/// Write `dataset` in the text data-directory layout.
pub fn write_dataset(dataset: &SyntheticDataset, root: &Path, featureset: &str) -> Result<()> {
    let net_dir = root.join("activations").join(&dataset.network);
    let subj_dir = root.join("subjects").join(featureset).join(&dataset.subject_name);
    fs::create_dir_all(&net_dir)?;
    fs::create_dir_all(&subj_dir)?;

    let ids = dataset.stimuli.join("\n") + "\n";
    fs::write(root.join("stimuli.txt"), &ids)?;
    fs::write(root.join("stimsequence.txt"), &ids)?;
    fs::write(subj_dir.join("stimseq.txt"), &ids)?;

    let mut layer_list = String::new();
    for (name, activity) in &dataset.layers {
        if name == PixelSource::LABEL {
            fs::write(root.join("pixels.txt"), write_grid(activity.view(), 6))?;
        } else {
            fs::write(net_dir.join(format!("{name}.txt")), write_grid(activity.view(), 6))?;
            layer_list.push_str(name);
            layer_list.push('\n');
        }
    }
    fs::write(net_dir.join("layers.txt"), layer_list)?;
    fs::write(subj_dir.join("data.txt"), write_grid(dataset.subject.responses.view(), 6))?;

    let assignment: Vec<String> = dataset.subject.assignment.iter().map(|l| l.to_string()).collect();
    fs::write(subj_dir.join("assignment.txt"), assignment.join(" ") + "\n")?;
    info!(root = %root.display(), probes = dataset.subject.assignment.len(), "wrote synthetic dataset");
    Ok(())
}
