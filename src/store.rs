//! store.rs - Text-grid persistence and the on-disk data directory.
//!
//! Matrices are stored as whitespace-delimited rows, one row per line, under
//! `<root>/<key>.txt`. Keys may contain `/` to form subdirectories.
//!
//! Data directory layout read by [`TextDataProvider`]:
//!
//! ```text
//! stimuli.txt                          model stimulus list, one per line
//! stimsequence.txt                     presentation sequence (repeats allowed)
//! pixels.txt                           pixel representation, model order
//! activations/<network>/layers.txt     layer names, shallow to deep
//! activations/<network>/<layer>.txt    layer activations, model order
//! subjects/<featureset>/<name>/stimseq.txt
//! subjects/<featureset>/<name>/data.txt
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2, Axis};
use tracing::debug;

use crate::error::{CollusionError, Result};

/// Marks a rejected observation in probe responses.
pub const POISON_PILL: f64 = -123456.0;

/// Persistence of named matrices.
pub trait MatrixStore {
    fn save_matrix(&self, key: &str, matrix: ArrayView2<'_, f64>, precision: usize) -> Result<()>;
    fn load_matrix(&self, key: &str) -> Result<Array2<f64>>;
    fn exists(&self, key: &str) -> bool;
    /// Names of the matrices stored directly under `dir`, sorted. A
    /// directory that does not exist lists nothing.
    fn list(&self, dir: &str) -> Result<Vec<String>>;
}

#[derive(Clone, Debug)]
pub struct TextGridStore {
    root: PathBuf,
}

impl TextGridStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.txt"))
    }
}

impl MatrixStore for TextGridStore {
    fn save_matrix(&self, key: &str, matrix: ArrayView2<'_, f64>, precision: usize) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, write_grid(matrix, precision))?;
        debug!(key, rows = matrix.nrows(), cols = matrix.ncols(), "saved matrix");
        Ok(())
    }

    fn load_matrix(&self, key: &str) -> Result<Array2<f64>> {
        let path = self.path_for(key);
        let text = fs::read_to_string(&path)?;
        parse_grid(&path.to_string_lossy(), &text)
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let path = self.root.join(dir);
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "txt") {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Render `matrix` with `precision` decimals per value.
pub fn write_grid(matrix: ArrayView2<'_, f64>, precision: usize) -> String {
    let mut out = String::new();
    for row in matrix.axis_iter(Axis(0)) {
        let mut first = true;
        for v in row.iter() {
            if !first {
                out.push(' ');
            }
            first = false;
            let _ = write!(out, "{v:.precision$}");
        }
        out.push('\n');
    }
    out
}

/// Parse a whitespace-delimited grid. Blank lines between rows are ignored.
/// Input made only of blank lines is an `n x 0` matrix, one row per line,
/// which is how `write_grid` renders a matrix without columns; an empty
/// input yields a 0x0 matrix.
pub fn parse_grid(origin: &str, text: &str) -> Result<Array2<f64>> {
    let mut values = Vec::new();
    let mut ncols: Option<usize> = None;
    let mut nrows = 0usize;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let before = values.len();
        for token in line.split_whitespace() {
            let v = token.parse::<f64>().map_err(|err| {
                CollusionError::parse(origin, format!("line {}: '{token}': {err}", lineno + 1))
            })?;
            values.push(v);
        }
        let width = values.len() - before;
        match ncols {
            None => ncols = Some(width),
            Some(expected) if expected != width => {
                return Err(CollusionError::parse(
                    origin,
                    format!("line {}: {width} values, expected {expected}", lineno + 1),
                ));
            }
            Some(_) => {}
        }
        nrows += 1;
    }
    let Some(ncols) = ncols else {
        return Ok(Array2::zeros((text.lines().count(), 0)));
    };
    Array2::from_shape_vec((nrows, ncols), values)
        .map_err(|err| CollusionError::parse(origin, err.to_string()))
}

/// Which model representation to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepresentationSet {
    Pixels,
    Layer { network: String, layer: String },
}

/// Responses of one subject: rows follow `stimulus_ids`, columns are probes.
#[derive(Clone, Debug)]
pub struct SubjectResponses {
    pub name: String,
    pub stimulus_ids: Vec<String>,
    pub data: Array2<f64>,
}

impl SubjectResponses {
    pub fn n_probes(&self) -> usize {
        self.data.ncols()
    }
}

/// Source of raw representations and subject recordings.
pub trait DataProvider {
    /// Stimulus ids in the order model representations are stored.
    fn model_stimuli(&self) -> Result<Vec<String>>;
    /// Presentation sequence used to order model RDMs.
    fn stimulation_sequence(&self) -> Result<Vec<String>>;
    fn layer_names(&self, network: &str) -> Result<Vec<String>>;
    fn load_representation(&self, set: &RepresentationSet) -> Result<Array2<f64>>;
    fn subjects(&self, featureset: &str) -> Result<Vec<String>>;
    fn load_responses(&self, featureset: &str, subject: &str) -> Result<SubjectResponses>;
}

#[derive(Clone, Debug)]
pub struct TextDataProvider {
    root: PathBuf,
}

impl TextDataProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_grid(&self, rel: impl AsRef<Path>) -> Result<Array2<f64>> {
        let path = self.root.join(rel);
        let text = fs::read_to_string(&path)?;
        parse_grid(&path.to_string_lossy(), &text)
    }

    fn read_ids(&self, rel: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.root.join(rel);
        Ok(parse_ids(&fs::read_to_string(path)?))
    }
}

/// Stimulus ids from a list file: first token of each line, extension dropped.
pub fn parse_ids(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| token.split('.').next().unwrap_or(token).to_string())
        .collect()
}

impl DataProvider for TextDataProvider {
    fn model_stimuli(&self) -> Result<Vec<String>> {
        self.read_ids("stimuli.txt")
    }

    fn stimulation_sequence(&self) -> Result<Vec<String>> {
        self.read_ids("stimsequence.txt")
    }

    fn layer_names(&self, network: &str) -> Result<Vec<String>> {
        let path = self.root.join("activations").join(network).join("layers.txt");
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn load_representation(&self, set: &RepresentationSet) -> Result<Array2<f64>> {
        match set {
            RepresentationSet::Pixels => self.read_grid("pixels.txt"),
            RepresentationSet::Layer { network, layer } => self.read_grid(
                Path::new("activations")
                    .join(network)
                    .join(format!("{layer}.txt")),
            ),
        }
    }

    fn subjects(&self, featureset: &str) -> Result<Vec<String>> {
        let dir = self.root.join("subjects").join(featureset);
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_responses(&self, featureset: &str, subject: &str) -> Result<SubjectResponses> {
        let dir = Path::new("subjects").join(featureset).join(subject);
        let stimulus_ids = self.read_ids(dir.join("stimseq.txt"))?;
        let mut data = self.read_grid(dir.join("data.txt"))?;
        if data.dim() == (0, 0) {
            // no probes recorded for this subject
            data = Array2::zeros((stimulus_ids.len(), 0));
        }
        if data.nrows() != stimulus_ids.len() {
            return Err(CollusionError::alignment(format!(
                "subject {subject}: {} response rows vs {} stimulus ids",
                data.nrows(),
                stimulus_ids.len()
            )));
        }
        Ok(SubjectResponses {
            name: subject.to_string(),
            stimulus_ids,
            data,
        })
    }
}

/// Rows of `activations` (in `model_ids` order) rearranged to follow
/// `stimulation`. Repeated stimuli repeat their row.
pub fn align_to_stimuli(
    model_ids: &[String],
    activations: &Array2<f64>,
    stimulation: &[String],
) -> Result<Array2<f64>> {
    if model_ids.len() != activations.nrows() {
        return Err(CollusionError::alignment(format!(
            "{} model stimulus ids vs {} activation rows",
            model_ids.len(),
            activations.nrows()
        )));
    }
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(model_ids.len());
    for (i, id) in model_ids.iter().enumerate() {
        index.entry(id.as_str()).or_insert(i);
    }
    let rows = stimulation
        .iter()
        .map(|id| {
            index.get(id.as_str()).copied().ok_or_else(|| {
                CollusionError::alignment(format!("stimulus '{id}' has no model activations"))
            })
        })
        .collect::<Result<Vec<usize>>>()?;
    Ok(activations.select(Axis(0), &rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn unique_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "collusion_store_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn grid_text_format() {
        let m = array![[0.0, 1.25], [1.25, 0.0]];
        assert_eq!(write_grid(m.view(), 3), "0.000 1.250\n1.250 0.000\n");
        let back = parse_grid("mem", "0.000 1.250\n\n1.250 0.000\n").unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn ragged_and_garbage_rows_are_parse_errors() {
        assert!(matches!(
            parse_grid("mem", "1 2\n3\n"),
            Err(CollusionError::Parse { .. })
        ));
        assert!(parse_grid("mem", "1 x\n").is_err());
        assert_eq!(parse_grid("mem", "").unwrap().dim(), (0, 0));
    }

    #[test]
    fn store_creates_nested_keys() {
        let root = unique_path("nested");
        let store = TextGridStore::new(&root);
        let key = "rsa/pixels.euclidean/dnn-pixels";
        assert!(!store.exists(key));
        store
            .save_matrix(key, array![[0.0, 0.5], [0.5, 0.0]].view(), 6)
            .unwrap();
        assert!(store.exists(key));
        assert_eq!(store.load_matrix(key).unwrap()[[0, 1]], 0.5);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn ids_drop_extensions_and_trailing_columns() {
        let ids = parse_ids("dog2.jpg animal\ncat1.png\n\nant3\n");
        assert_eq!(ids, vec!["dog2", "cat1", "ant3"]);
    }

    #[test]
    fn alignment_follows_stimulation_sequence() {
        let model = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let acts = array![[1.0], [2.0], [3.0]];
        let stim = vec!["c".to_string(), "a".to_string(), "c".to_string()];
        let aligned = align_to_stimuli(&model, &acts, &stim).unwrap();
        assert_eq!(aligned, array![[3.0], [1.0], [3.0]]);

        let unknown = vec!["z".to_string()];
        assert!(matches!(
            align_to_stimuli(&model, &acts, &unknown),
            Err(CollusionError::DataAlignment(_))
        ));
    }

    #[test]
    fn text_provider_reads_layout() {
        let root = unique_path("provider");
        let subj = root.join("subjects").join("lfp").join("s01");
        fs::create_dir_all(&subj).unwrap();
        fs::create_dir_all(root.join("activations").join("alexnet")).unwrap();
        fs::write(root.join("stimuli.txt"), "a.jpg\nb.jpg\n").unwrap();
        fs::write(root.join("activations/alexnet/layers.txt"), "conv1\nfc8\n").unwrap();
        fs::write(root.join("activations/alexnet/conv1.txt"), "1 2\n3 4\n").unwrap();
        fs::write(subj.join("stimseq.txt"), "b\na\nb\n").unwrap();
        fs::write(subj.join("data.txt"), "0.1 0.2\n0.3 0.4\n0.5 0.6\n").unwrap();

        let provider = TextDataProvider::new(&root);
        assert_eq!(provider.model_stimuli().unwrap(), vec!["a", "b"]);
        assert_eq!(provider.layer_names("alexnet").unwrap(), vec!["conv1", "fc8"]);
        let conv1 = provider
            .load_representation(&RepresentationSet::Layer {
                network: "alexnet".into(),
                layer: "conv1".into(),
            })
            .unwrap();
        assert_eq!(conv1.dim(), (2, 2));
        assert_eq!(provider.subjects("lfp").unwrap(), vec!["s01"]);
        let resp = provider.load_responses("lfp", "s01").unwrap();
        assert_eq!(resp.n_probes(), 2);
        assert_eq!(resp.stimulus_ids, vec!["b", "a", "b"]);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn matrix_without_columns_keeps_its_rows() {
        let root = unique_path("no_columns");
        let store = TextGridStore::new(&root);
        store
            .save_matrix("maps/empty", Array2::<f64>::zeros((3, 0)).view(), 4)
            .unwrap();
        assert_eq!(store.load_matrix("maps/empty").unwrap().dim(), (3, 0));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn subject_without_probes_loads() {
        let root = unique_path("no_probes");
        let provider = TextDataProvider::new(&root);
        for (subject, data) in [("s01", "\n\n\n"), ("s02", "")] {
            let dir = root.join("subjects").join("lfp").join(subject);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("stimseq.txt"), "a\nb\nc\n").unwrap();
            fs::write(dir.join("data.txt"), data).unwrap();

            let responses = provider.load_responses("lfp", subject).unwrap();
            assert_eq!(responses.data.dim(), (3, 0), "{subject}");
            assert_eq!(responses.n_probes(), 0);
        }
        let _ = fs::remove_dir_all(&root);
    }
}
