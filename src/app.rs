//! app.rs - Pipeline drivers behind the CLI subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::cli::{Args, Command, SourceKind};
use crate::config::AppConfig;
use crate::core::stats::nan_to_zero;
use crate::error::{CollusionError, Result};
use crate::mapping::grid::{ParallelGridExecutor, aggregate, build_tasks};
use crate::rsa::dissimilarity::{DissimilarityMatrix, Metric, compute_scalar};
use crate::rsa::order::StimulusOrderer;
use crate::rsa::permutation::{NULL_THRESHOLD, collect_null, empirical_p};
use crate::rsa::scorer::{Scope, score, score_grid, threshold_tag};
use crate::rsa::source::{
    BrainSource, NetworkSource, PixelSource, RdmNamespace, RepresentationSource,
    layer_storage_name, load_area_rdms, load_model_rdms, load_probe_rdms, pixel_storage_name,
};
use crate::store::{
    DataProvider, MatrixStore, RepresentationSet, SubjectResponses, TextDataProvider,
    TextGridStore, align_to_stimuli,
};
use crate::synthetic::{DatasetShape, random_dataset, write_dataset};

/// Decimals kept for score matrices and null distributions.
pub const SCORE_PRECISION: usize = 4;

/// Load config, apply CLI overrides and run the requested subcommand.
pub fn run(args: Args) -> Result<()> {
    let mut cfg = AppConfig::load_or_default(&args.config);
    if let Some(dir) = args.data_dir {
        cfg.paths.data_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        cfg.paths.output_dir = dir;
    }
    if let Some(featureset) = args.featureset {
        cfg.paths.featureset = featureset;
    }
    cfg.validate()?;

    match args.command {
        Command::Rdm {
            kind,
            metric,
            network,
            sid,
            shuffle,
        } => {
            let metric = metric.unwrap_or(cfg.rsa.metric);
            run_rdm(&cfg, kind, metric, network.as_deref(), sid, shuffle).map(|_| ())
        }
        Command::Rsa {
            sid,
            network,
            metric,
            scope,
            threshold,
        } => {
            let metric = metric.unwrap_or(cfg.rsa.metric);
            let scope = scope.unwrap_or(cfg.rsa.scope);
            let threshold = threshold.unwrap_or(cfg.rsa.threshold);
            run_rsa(&cfg, sid, &network, metric, scope, threshold).map(|_| ())
        }
        Command::AreaRsa {
            network,
            metric,
            scope,
            threshold,
        } => {
            let metric = metric.unwrap_or(cfg.rsa.metric);
            let scope = scope.unwrap_or(cfg.rsa.scope);
            let threshold = threshold.unwrap_or(cfg.rsa.threshold);
            run_area_rsa(&cfg, &network, metric, scope, threshold).map(|_| ())
        }
        Command::Map {
            sid,
            network,
            workers,
            seed,
        } => {
            if let Some(workers) = workers {
                cfg.executor.workers = workers;
            }
            if seed.is_some() {
                cfg.executor.seed = seed;
            }
            run_map(&cfg, sid, &network).map(|_| ())
        }
        Command::Permute {
            sid,
            probe,
            layer,
            network,
            n,
            metric,
            scope,
            seed,
        } => {
            let request = PermutationRequest {
                sid,
                probe,
                layer,
                network,
                n_perm: n.unwrap_or(cfg.rsa.permutations),
                metric: metric.unwrap_or(cfg.rsa.metric),
                scope: scope.unwrap_or(cfg.rsa.scope),
                seed: seed.or(cfg.executor.seed),
            };
            run_permute(&cfg, &request).map(|_| ())
        }
        Command::Synth {
            out,
            stimuli,
            probes,
            layers,
            width,
            seed,
        } => {
            let root = PathBuf::from(out.unwrap_or_else(|| cfg.paths.data_dir.clone()));
            let shape = DatasetShape {
                stimuli,
                probes,
                layers,
                width,
            };
            run_synth(&cfg, &root, &shape, seed)
        }
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

fn model_orderer(provider: &dyn DataProvider) -> Result<StimulusOrderer> {
    let stimulation = provider.stimulation_sequence()?;
    let model = provider.model_stimuli()?;
    Ok(StimulusOrderer::from_sequences(&stimulation, &model))
}

/// Subject `sid` in sorted directory order.
fn load_subject(provider: &dyn DataProvider, featureset: &str, sid: usize) -> Result<SubjectResponses> {
    let subjects = provider.subjects(featureset)?;
    let name = subjects.get(sid).ok_or_else(|| {
        CollusionError::invalid(format!(
            "subject index {sid} out of range, featureset {featureset} has {} subjects",
            subjects.len()
        ))
    })?;
    provider.load_responses(featureset, name)
}

/// Compute and store RDMs for one source; returns how many were written.
pub fn run_rdm(
    cfg: &AppConfig,
    kind: SourceKind,
    metric: Metric,
    network: Option<&str>,
    sid: Option<usize>,
    shuffle: bool,
) -> Result<usize> {
    let provider = TextDataProvider::new(&cfg.paths.data_dir);
    let store = TextGridStore::new(&cfg.paths.output_dir);
    let ns = RdmNamespace::new(cfg.paths.featureset.clone(), metric, shuffle);
    let mut rng = rng_from(cfg.executor.seed);

    match kind {
        SourceKind::Pixels => {
            let orderer = model_orderer(&provider)?;
            let mut source = PixelSource::from_provider(&provider, &orderer)?;
            if shuffle {
                source = source.shuffled(&mut rng);
            }
            persist_model_source(&source, &store, &ns, metric)
        }
        SourceKind::Dnn => {
            let network = network.ok_or(CollusionError::MissingArgument("network"))?;
            let orderer = model_orderer(&provider)?;
            let mut source = NetworkSource::from_provider(&provider, network, &orderer)?;
            if shuffle {
                source = source.shuffled(&mut rng);
            }
            persist_model_source(&source, &store, &ns, metric)
        }
        SourceKind::Brain => {
            let sid = sid.ok_or(CollusionError::MissingArgument("sid"))?;
            let responses = load_subject(&provider, &cfg.paths.featureset, sid)?;
            let brain = BrainSource::new(&responses, shuffle, &mut rng)?;
            brain.compute_and_save_batch(&store, &ns)
        }
    }
}

fn persist_model_source<S: RepresentationSource>(
    source: &S,
    store: &dyn MatrixStore,
    ns: &RdmNamespace,
    metric: Metric,
) -> Result<usize> {
    info!(labels = ?source.labels(), %metric, "computing model RDMs");
    let rdms = source.compute(metric);
    source.persist(store, ns, &rdms)?;
    Ok(rdms.len())
}

/// Score matrix (probes x [pixels, layers...]) for one subject.
pub fn run_rsa(
    cfg: &AppConfig,
    sid: usize,
    network: &str,
    metric: Metric,
    scope: Scope,
    threshold: f64,
) -> Result<Array2<f64>> {
    let provider = TextDataProvider::new(&cfg.paths.data_dir);
    let store = TextGridStore::new(&cfg.paths.output_dir);
    let ns = RdmNamespace::new(cfg.paths.featureset.clone(), metric, false);

    let subject = provider
        .subjects(&cfg.paths.featureset)?
        .get(sid)
        .cloned()
        .ok_or_else(|| CollusionError::invalid(format!("subject index {sid} out of range")))?;
    let layers = load_model_rdms(&store, &ns, network, &provider.layer_names(network)?)?;
    let probes = load_probe_rdms(&store, &ns, &subject)?;
    if probes.is_empty() {
        return Err(CollusionError::invalid(format!(
            "no brain RDMs stored for {subject} under {}",
            ns.tag()
        )));
    }

    info!(%subject, probes = probes.len(), layers = layers.len(), %scope, threshold, "scoring RDM pairs");
    let scores = score_grid(&layers, &probes, scope, threshold)?;
    let key = format!(
        "maps/rsa_{}.{}.{}{}/{}",
        ns.tag(),
        network,
        scope,
        threshold_tag(threshold),
        subject
    );
    store.save_matrix(&key, scores.view(), SCORE_PRECISION)?;
    Ok(scores)
}

/// Score matrix (areas x [pixels, layers...]) over the area RDMs stored in
/// the namespace; rows follow the sorted area names.
pub fn run_area_rsa(
    cfg: &AppConfig,
    network: &str,
    metric: Metric,
    scope: Scope,
    threshold: f64,
) -> Result<Array2<f64>> {
    let provider = TextDataProvider::new(&cfg.paths.data_dir);
    let store = TextGridStore::new(&cfg.paths.output_dir);
    let ns = RdmNamespace::new(cfg.paths.featureset.clone(), metric, false);

    let areas = load_area_rdms(&store, &ns)?;
    if areas.is_empty() {
        return Err(CollusionError::invalid(format!(
            "no area RDMs stored under {}",
            ns.dir()
        )));
    }
    let layers = load_model_rdms(&store, &ns, network, &provider.layer_names(network)?)?;
    let labels: Vec<&str> = areas.iter().map(|(name, _)| name.as_str()).collect();
    info!(areas = ?labels, layers = layers.len(), %scope, threshold, "scoring area RDMs");

    let probes: Vec<DissimilarityMatrix> = areas.into_iter().map(|(_, rdm)| rdm).collect();
    let scores = score_grid(&layers, &probes, scope, threshold)?;
    let key = format!(
        "maps/rsa_{}.{}.{}{}/all",
        ns.tag(),
        network,
        scope,
        threshold_tag(threshold)
    );
    store.save_matrix(&key, scores.view(), SCORE_PRECISION)?;
    Ok(scores)
}

/// Regression score matrix (probes x [pixels, layers...]) for one subject.
pub fn run_map(cfg: &AppConfig, sid: usize, network: &str) -> Result<Array2<f64>> {
    let provider = TextDataProvider::new(&cfg.paths.data_dir);
    let store = TextGridStore::new(&cfg.paths.output_dir);

    let responses = load_subject(&provider, &cfg.paths.featureset, sid)?;
    let model_ids = provider.model_stimuli()?;

    let mut sets = vec![(PixelSource::LABEL.to_string(), RepresentationSet::Pixels)];
    for layer in provider.layer_names(network)? {
        sets.push((
            layer.clone(),
            RepresentationSet::Layer {
                network: network.to_string(),
                layer,
            },
        ));
    }
    let mut layers = Vec::with_capacity(sets.len());
    for (name, set) in sets {
        let raw = provider.load_representation(&set)?;
        let aligned = align_to_stimuli(&model_ids, &raw, &responses.stimulus_ids)?;
        layers.push((name, Arc::new(aligned)));
    }

    info!(
        subject = %responses.name,
        probes = responses.n_probes(),
        layers = layers.len(),
        "mapping probes to layers"
    );
    let tasks = build_tasks(&layers, &responses.data, cfg.executor.seed)?;
    let results = ParallelGridExecutor::new(cfg.executor.workers).run(tasks, &cfg.regression)?;
    let skipped = results.values().filter(|o| o.skipped).count();
    if skipped > 0 {
        info!(skipped, "tasks skipped");
    }

    let scores = aggregate(&results, responses.n_probes(), layers.len());
    let key = format!("maps/lp_{}/{}", cfg.paths.featureset, responses.name);
    store.save_matrix(&key, scores.view(), SCORE_PRECISION)?;
    Ok(scores)
}

#[derive(Clone, Debug)]
pub struct PermutationRequest {
    pub sid: usize,
    pub probe: usize,
    pub layer: String,
    pub network: String,
    pub n_perm: usize,
    pub metric: Metric,
    pub scope: Scope,
    pub seed: Option<u64>,
}

/// Observed unfiltered score, its null distribution, and the empirical p-value.
#[derive(Clone, Debug)]
pub struct PermutationOutcome {
    pub observed: f64,
    pub null: Vec<f64>,
    pub p_value: f64,
}

pub fn run_permute(cfg: &AppConfig, request: &PermutationRequest) -> Result<PermutationOutcome> {
    let provider = TextDataProvider::new(&cfg.paths.data_dir);
    let store = TextGridStore::new(&cfg.paths.output_dir);
    let ns = RdmNamespace::new(cfg.paths.featureset.clone(), request.metric, false);
    let mut rng = rng_from(request.seed);

    let name = if request.layer == PixelSource::LABEL {
        pixel_storage_name()
    } else {
        layer_storage_name(&request.layer, &request.network)
    };
    let layer_rdm = DissimilarityMatrix::from_stored(store.load_matrix(&ns.key(&name))?)?;

    let responses = load_subject(&provider, &cfg.paths.featureset, request.sid)?;
    let brain = BrainSource::new(&responses, false, &mut rng)?;
    let values = brain.probe_values(request.probe)?;

    let observed = nan_to_zero(score(
        &layer_rdm,
        &compute_scalar(values),
        request.scope,
        NULL_THRESHOLD,
    )?);
    let null = collect_null(&layer_rdm, values, request.n_perm, request.scope, &mut rng)?;
    let p_value = empirical_p(observed, &null);
    info!(
        subject = %responses.name,
        probe = request.probe,
        layer = %request.layer,
        observed,
        p_value,
        "permutation test"
    );

    let key = format!(
        "permutations/{}.{}.{}/{}-{}-{}",
        ns.tag(),
        request.network,
        request.scope,
        responses.name,
        request.layer,
        request.probe
    );
    let column = Array1::from_vec(null.clone()).insert_axis(ndarray::Axis(1));
    store.save_matrix(&key, column.view(), SCORE_PRECISION)?;

    Ok(PermutationOutcome {
        observed,
        null,
        p_value,
    })
}

pub fn run_synth(cfg: &AppConfig, root: &Path, shape: &DatasetShape, seed: Option<u64>) -> Result<()> {
    let mut rng = rng_from(seed.or(cfg.executor.seed));
    let dataset = random_dataset(shape, &mut rng)?;
    write_dataset(&dataset, root, &cfg.paths.featureset)
}
