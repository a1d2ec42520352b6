//! rsa/source.rs - Representation sources that produce and persist RDMs.
//!
//! Model sources (pixels, network layers) share the [`RepresentationSource`]
//! capability set. Brain recordings have a narrower API: one scalar RDM per
//! probe, computed in batch, and no generic save/load.

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::error::{CollusionError, Result};
use crate::rsa::dissimilarity::{DissimilarityMatrix, Metric, compute, compute_scalar};
use crate::rsa::order::{StimulusOrderer, category_order, reorder, shuffle};
use crate::store::{
    DataProvider, MatrixStore, POISON_PILL, RepresentationSet, SubjectResponses,
};

/// Decimals kept for model RDMs on disk.
pub const MODEL_RDM_PRECISION: usize = 6;
/// Decimals kept for brain RDMs on disk.
pub const BRAIN_RDM_PRECISION: usize = 3;

/// Storage directory of one family of RDMs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdmNamespace {
    pub featureset: String,
    pub metric: Metric,
    pub shuffled: bool,
}

impl RdmNamespace {
    pub fn new(featureset: impl Into<String>, metric: Metric, shuffled: bool) -> Self {
        Self {
            featureset: featureset.into(),
            metric,
            shuffled,
        }
    }

    /// `<featureset>.<metric>` plus `.shuffled` for permuted runs.
    pub fn tag(&self) -> String {
        let suffix = if self.shuffled { ".shuffled" } else { "" };
        format!("{}.{}{}", self.featureset, self.metric, suffix)
    }

    /// Store directory holding every RDM of this family.
    pub fn dir(&self) -> String {
        format!("rsa/{}", self.tag())
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.dir(), name)
    }
}

/// A labelled RDM, e.g. `("conv3", rdm)`.
pub type NamedRdm = (String, DissimilarityMatrix);

/// Model-side representation: one or more row-aligned matrices.
pub trait RepresentationSource: Sized {
    /// Labels in column order of the score matrix.
    fn labels(&self) -> Vec<String>;

    /// File stem under the RDM namespace for `label`.
    fn storage_name(&self, label: &str) -> String;

    fn reordered(&self, order: &[usize]) -> Result<Self>;

    fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self;

    fn compute(&self, metric: Metric) -> Vec<NamedRdm>;

    fn persist(&self, store: &dyn MatrixStore, ns: &RdmNamespace, rdms: &[NamedRdm]) -> Result<()> {
        for (label, rdm) in rdms {
            let key = ns.key(&self.storage_name(label));
            store.save_matrix(&key, rdm.as_array().view(), MODEL_RDM_PRECISION)?;
        }
        Ok(())
    }

    fn load(&self, store: &dyn MatrixStore, ns: &RdmNamespace) -> Result<Vec<NamedRdm>> {
        self.labels()
            .into_iter()
            .map(|label| {
                let key = ns.key(&self.storage_name(&label));
                let rdm = DissimilarityMatrix::from_stored(store.load_matrix(&key)?)?;
                Ok((label, rdm))
            })
            .collect()
    }
}

pub fn pixel_storage_name() -> String {
    "dnn-pixels".to_string()
}

pub fn layer_storage_name(layer: &str, network: &str) -> String {
    format!("dnn-{layer}-{network}")
}

/// Stored model RDMs in score-matrix column order: pixels, then `layers`.
pub fn load_model_rdms(
    store: &dyn MatrixStore,
    ns: &RdmNamespace,
    network: &str,
    layers: &[String],
) -> Result<Vec<NamedRdm>> {
    let mut keys = vec![(PixelSource::LABEL.to_string(), pixel_storage_name())];
    keys.extend(
        layers
            .iter()
            .map(|layer| (layer.clone(), layer_storage_name(layer, network))),
    );
    keys.into_iter()
        .map(|(label, name)| {
            let rdm = DissimilarityMatrix::from_stored(store.load_matrix(&ns.key(&name))?)?;
            Ok((label, rdm))
        })
        .collect()
}

/// Raw pixel space, the model's "layer 0".
#[derive(Clone, Debug)]
pub struct PixelSource {
    representation: Array2<f64>,
}

impl PixelSource {
    pub const LABEL: &'static str = "pixels";

    pub fn new(representation: Array2<f64>) -> Self {
        Self { representation }
    }

    /// Load pixels and bring them into category order.
    pub fn from_provider(provider: &dyn DataProvider, orderer: &StimulusOrderer) -> Result<Self> {
        let raw = provider.load_representation(&RepresentationSet::Pixels)?;
        Ok(Self::new(reorder(&raw, orderer.model_order())?))
    }

    pub fn representation(&self) -> &Array2<f64> {
        &self.representation
    }
}

impl RepresentationSource for PixelSource {
    fn labels(&self) -> Vec<String> {
        vec![Self::LABEL.to_string()]
    }

    fn storage_name(&self, _label: &str) -> String {
        pixel_storage_name()
    }

    fn reordered(&self, order: &[usize]) -> Result<Self> {
        Ok(Self::new(reorder(&self.representation, order)?))
    }

    fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self::new(shuffle(&self.representation, rng))
    }

    fn compute(&self, metric: Metric) -> Vec<NamedRdm> {
        vec![(Self::LABEL.to_string(), compute(&self.representation, metric))]
    }
}

/// Per-layer activations of one network.
#[derive(Clone, Debug)]
pub struct NetworkSource {
    network: String,
    layers: Vec<(String, Array2<f64>)>,
}

impl NetworkSource {
    pub fn new(network: impl Into<String>, layers: Vec<(String, Array2<f64>)>) -> Self {
        Self {
            network: network.into(),
            layers,
        }
    }

    /// Load every layer listed for `network` and bring it into category order.
    pub fn from_provider(
        provider: &dyn DataProvider,
        network: &str,
        orderer: &StimulusOrderer,
    ) -> Result<Self> {
        let mut layers = Vec::new();
        for layer in provider.layer_names(network)? {
            let raw = provider.load_representation(&RepresentationSet::Layer {
                network: network.to_string(),
                layer: layer.clone(),
            })?;
            layers.push((layer, reorder(&raw, orderer.model_order())?));
        }
        Ok(Self::new(network, layers))
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn layers(&self) -> &[(String, Array2<f64>)] {
        &self.layers
    }
}

impl RepresentationSource for NetworkSource {
    fn labels(&self) -> Vec<String> {
        self.layers.iter().map(|(name, _)| name.clone()).collect()
    }

    fn storage_name(&self, label: &str) -> String {
        layer_storage_name(label, &self.network)
    }

    fn reordered(&self, order: &[usize]) -> Result<Self> {
        let layers = self
            .layers
            .iter()
            .map(|(name, m)| Ok((name.clone(), reorder(m, order)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(self.network.clone(), layers))
    }

    /// Each layer gets its own independent permutation.
    fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let layers = self
            .layers
            .iter()
            .map(|(name, m)| (name.clone(), shuffle(m, rng)))
            .collect();
        Self::new(self.network.clone(), layers)
    }

    fn compute(&self, metric: Metric) -> Vec<NamedRdm> {
        self.layers
            .iter()
            .map(|(name, m)| {
                debug!(layer = %name, network = %self.network, "computing layer RDM");
                (name.clone(), compute(m, metric))
            })
            .collect()
    }
}

/// Scalar responses of one subject's probes, in category order.
///
/// Rejected observations are replaced by 0.0. Probe RDMs are always
/// Euclidean whatever metric the namespace names.
#[derive(Clone, Debug)]
pub struct BrainSource {
    subject: String,
    representation: Array2<f64>,
    shuffle: bool,
}

impl BrainSource {
    pub fn new<R: Rng + ?Sized>(responses: &SubjectResponses, shuffle_rows: bool, rng: &mut R) -> Result<Self> {
        warn!(
            subject = %responses.name,
            "brain responses are scalars, probe RDMs use euclidean distance"
        );
        let order = category_order(&responses.stimulus_ids);
        let mut representation = reorder(&responses.data, &order)?;
        representation.mapv_inplace(|v| if v == POISON_PILL { 0.0 } else { v });
        if shuffle_rows {
            representation = shuffle(&representation, rng);
        }
        Ok(Self {
            subject: responses.name.clone(),
            representation,
            shuffle: shuffle_rows,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn n_stimuli(&self) -> usize {
        self.representation.nrows()
    }

    pub fn n_probes(&self) -> usize {
        self.representation.ncols()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn storage_name(subject: &str, pid: usize) -> String {
        format!("brain-{subject}-{pid}")
    }

    pub fn probe_values(&self, pid: usize) -> Result<ArrayView1<'_, f64>> {
        if pid >= self.n_probes() {
            return Err(CollusionError::invalid(format!(
                "probe {pid} out of range, subject {} has {} probes",
                self.subject,
                self.n_probes()
            )));
        }
        Ok(self.representation.column(pid))
    }

    /// RDM of one probe. In shuffle mode each call draws a fresh permutation
    /// of the probe's responses; the source itself is left unchanged.
    pub fn compute_probe<R: Rng + ?Sized>(&self, pid: usize, rng: &mut R) -> Result<DissimilarityMatrix> {
        let values = self.probe_values(pid)?;
        if !self.shuffle {
            return Ok(compute_scalar(values));
        }
        let mut permuted = values.to_vec();
        permuted.shuffle(rng);
        Ok(compute_scalar(Array1::from_vec(permuted).view()))
    }

    /// Compute and save every probe RDM; returns how many were written.
    /// A subject without probes still gets one all-zero matrix at index 0.
    pub fn compute_and_save_batch(&self, store: &dyn MatrixStore, ns: &RdmNamespace) -> Result<usize> {
        info!(subject = %self.subject, probes = self.n_probes(), "computing brain RDMs");
        if self.n_probes() == 0 {
            let zeros = DissimilarityMatrix::zeros(self.n_stimuli());
            let key = ns.key(&Self::storage_name(&self.subject, 0));
            store.save_matrix(&key, zeros.as_array().view(), BRAIN_RDM_PRECISION)?;
            return Ok(1);
        }
        for pid in 0..self.n_probes() {
            let rdm = compute_scalar(self.representation.column(pid));
            let key = ns.key(&Self::storage_name(&self.subject, pid));
            store.save_matrix(&key, rdm.as_array().view(), BRAIN_RDM_PRECISION)?;
        }
        Ok(self.n_probes())
    }

    /// Previously saved RDM of one probe. Not available in shuffle mode.
    pub fn stored_probe(&self, store: &dyn MatrixStore, ns: &RdmNamespace, pid: usize) -> Result<DissimilarityMatrix> {
        if self.shuffle {
            return Err(CollusionError::unsupported(
                "stored brain RDMs cannot be used in shuffle mode, compute them instead",
            ));
        }
        load_probe_rdm(store, ns, &self.subject, pid)
    }
}

fn load_probe_rdm(store: &dyn MatrixStore, ns: &RdmNamespace, subject: &str, pid: usize) -> Result<DissimilarityMatrix> {
    let key = ns.key(&BrainSource::storage_name(subject, pid));
    DissimilarityMatrix::from_stored(store.load_matrix(&key)?)
}

/// All saved probe RDMs of `subject`, in probe order.
pub fn load_probe_rdms(store: &dyn MatrixStore, ns: &RdmNamespace, subject: &str) -> Result<Vec<DissimilarityMatrix>> {
    let mut rdms = Vec::new();
    while store.exists(&ns.key(&BrainSource::storage_name(subject, rdms.len()))) {
        rdms.push(load_probe_rdm(store, ns, subject, rdms.len())?);
    }
    Ok(rdms)
}

/// Stem prefix of area-level RDMs (rows and columns are stimuli, one matrix
/// per brain area). These are produced outside this crate and dropped into
/// the namespace directory.
pub const AREA_PREFIX: &str = "area-";

/// All area RDMs in the namespace, sorted by name, labelled without the
/// prefix.
pub fn load_area_rdms(store: &dyn MatrixStore, ns: &RdmNamespace) -> Result<Vec<NamedRdm>> {
    let dir = ns.dir();
    store
        .list(&dir)?
        .into_iter()
        .filter_map(|name| name.strip_prefix(AREA_PREFIX).map(str::to_string))
        .map(|area| {
            let key = ns.key(&format!("{AREA_PREFIX}{area}"));
            let rdm = DissimilarityMatrix::from_stored(store.load_matrix(&key)?)?;
            Ok((area, rdm))
        })
        .collect()
}
