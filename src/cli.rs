use clap::{Parser, Subcommand, ValueEnum};

use crate::rsa::dissimilarity::Metric;
use crate::rsa::scorer::Scope;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML
    #[arg(long, default_value = "collusion.toml")]
    pub config: String,

    /// Data directory (overrides config)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Output directory for RDMs and score matrices (overrides config)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Brain feature set name (overrides config)
    #[arg(long)]
    pub featureset: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pixels,
    Dnn,
    Brain,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compute and store dissimilarity matrices
    Rdm {
        /// Data source
        #[arg(long = "type", value_enum)]
        kind: SourceKind,
        /// Distance metric (overrides config)
        #[arg(long)]
        metric: Option<Metric>,
        /// Network whose activations to use (dnn only)
        #[arg(long)]
        network: Option<String>,
        /// Subject index (brain only)
        #[arg(long)]
        sid: Option<usize>,
        /// Permute stimulus rows before computing
        #[arg(long, default_value_t = false)]
        shuffle: bool,
    },

    /// Score every probe RDM of a subject against every layer RDM
    Rsa {
        #[arg(long)]
        sid: usize,
        #[arg(long)]
        network: String,
        #[arg(long)]
        metric: Option<Metric>,
        /// Correlate whole matrices or image rows
        #[arg(long)]
        scope: Option<Scope>,
        /// Significance a score must reach to count (1.0 stores all)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Score externally computed area RDMs (`area-*`) against every layer RDM
    AreaRsa {
        #[arg(long)]
        network: String,
        #[arg(long)]
        metric: Option<Metric>,
        #[arg(long)]
        scope: Option<Scope>,
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Ridge-regression mapping of every probe onto every layer
    Map {
        #[arg(long)]
        sid: usize,
        #[arg(long)]
        network: String,
        /// Worker threads (overrides config)
        #[arg(long)]
        workers: Option<usize>,
        /// Base seed for reproducible runs (overrides config)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Permutation null distribution for one probe-layer RSA score
    Permute {
        #[arg(long)]
        sid: usize,
        #[arg(long)]
        probe: usize,
        #[arg(long)]
        layer: String,
        #[arg(long)]
        network: String,
        /// Number of permutations (overrides config)
        #[arg(long)]
        n: Option<usize>,
        #[arg(long)]
        metric: Option<Metric>,
        #[arg(long)]
        scope: Option<Scope>,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write a synthetic data directory with a known probe-to-layer assignment
    Synth {
        /// Target directory (defaults to the data directory)
        #[arg(long)]
        out: Option<String>,
        #[arg(long, default_value_t = 60)]
        stimuli: usize,
        #[arg(long, default_value_t = 8)]
        probes: usize,
        /// Network layers on top of pixels
        #[arg(long, default_value_t = 3)]
        layers: usize,
        /// Features per layer
        #[arg(long, default_value_t = 40)]
        width: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}
