use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CollusionError, Result};
use crate::rsa::dissimilarity::Metric;
use crate::rsa::scorer::Scope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: String,
    #[serde(default = "PathsConfig::default_output_dir")]
    pub output_dir: String,
    #[serde(default = "PathsConfig::default_featureset")]
    pub featureset: String,
}

impl PathsConfig {
    fn default_data_dir() -> String {
        "data".to_string()
    }
    fn default_output_dir() -> String {
        "results".to_string()
    }
    fn default_featureset() -> String {
        "meangamma".to_string()
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            output_dir: Self::default_output_dir(),
            featureset: Self::default_featureset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsaConfig {
    #[serde(default = "RsaConfig::default_metric")]
    pub metric: Metric,
    #[serde(default = "RsaConfig::default_scope")]
    pub scope: Scope,
    /// Significance a correlation needs to count; 1.0 keeps every score.
    #[serde(default = "RsaConfig::default_threshold")]
    pub threshold: f64,
    #[serde(default = "RsaConfig::default_permutations")]
    pub permutations: usize,
}

impl RsaConfig {
    fn default_metric() -> Metric {
        Metric::Correlation
    }
    fn default_scope() -> Scope {
        Scope::Image
    }
    fn default_threshold() -> f64 {
        0.01
    }
    fn default_permutations() -> usize {
        1000
    }
}

impl Default for RsaConfig {
    fn default() -> Self {
        Self {
            metric: Self::default_metric(),
            scope: Self::default_scope(),
            threshold: Self::default_threshold(),
            permutations: Self::default_permutations(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    #[serde(default = "RegressionConfig::default_n_runs")]
    pub n_runs: usize,
    #[serde(default = "RegressionConfig::default_n_folds")]
    pub n_folds: usize,
    #[serde(default = "RegressionConfig::default_n_components")]
    pub n_components: usize,
    #[serde(default = "RegressionConfig::default_jitter")]
    pub jitter: f64,
    /// Runs with a larger p-value score 0.
    #[serde(default = "RegressionConfig::default_significance")]
    pub significance: f64,
    #[serde(default = "RegressionConfig::default_max_eigen_sweeps")]
    pub max_eigen_sweeps: usize,
    /// Shuffle responses before fitting (permutation baseline).
    #[serde(default)]
    pub permute_responses: bool,
}

impl RegressionConfig {
    fn default_n_runs() -> usize {
        7
    }
    fn default_n_folds() -> usize {
        10
    }
    fn default_n_components() -> usize {
        200
    }
    fn default_jitter() -> f64 {
        1e-6
    }
    fn default_significance() -> f64 {
        1e-4
    }
    fn default_max_eigen_sweeps() -> usize {
        100
    }
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            n_runs: Self::default_n_runs(),
            n_folds: Self::default_n_folds(),
            n_components: Self::default_n_components(),
            jitter: Self::default_jitter(),
            significance: Self::default_significance(),
            max_eigen_sweeps: Self::default_max_eigen_sweeps(),
            permute_responses: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "ExecutorConfig::default_workers")]
    pub workers: usize,
    /// Base seed for per-task generators; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ExecutorConfig {
    fn default_workers() -> usize {
        6
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub rsa: RsaConfig,
    #[serde(default)]
    pub regression: RegressionConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl AppConfig {
    /// Reject values no pipeline can run with.
    pub fn validate(&self) -> Result<()> {
        if self.regression.n_folds < 2 {
            return Err(CollusionError::invalid("regression.n_folds must be at least 2"));
        }
        if self.rsa.threshold.is_nan() || self.rsa.threshold <= 0.0 {
            return Err(CollusionError::invalid("rsa.threshold must be positive"));
        }
        if self.regression.jitter < 0.0 {
            return Err(CollusionError::invalid("regression.jitter must not be negative"));
        }
        Ok(())
    }

    /// Load `path`, or write a fully commented default file there and use
    /// the defaults. A file that cannot be read or parsed falls back to the
    /// defaults without being overwritten.
    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        tracing::warn!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    tracing::warn!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, Self::commented(&text)) {
                    tracing::warn!("Failed to write default config to {path}: {err}");
                }
            }
            Err(err) => {
                tracing::warn!("Failed to serialize default config: {err}; continuing with defaults");
            }
        }
        default_cfg
    }

    /// Comment out every key, keeping section headers live.
    fn commented(text: &str) -> String {
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                commented.push_str(line);
                commented.push('\n');
            } else {
                commented.push_str("# ");
                commented.push_str(line);
                commented.push('\n');
            }
        }
        commented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "collusion_config_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn load_or_default_writes_defaults_cleanly() {
        let path = unique_path("defaults.toml");
        let path_str = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        let cfg = AppConfig::load_or_default(&path_str);
        assert!(path.exists(), "config file should be created");
        assert_eq!(cfg.regression.n_runs, 7);
        assert_eq!(cfg.regression.n_folds, 10);
        assert_eq!(cfg.regression.n_components, 200);
        assert_eq!(cfg.executor.workers, 6);
        assert_eq!(cfg.executor.seed, None);
        assert_eq!(cfg.rsa.metric, Metric::Correlation);

        let contents = fs::read_to_string(&path).expect("read written config");
        assert!(contents.contains("[regression]"), "sections stay live");
        assert!(
            contents.contains("# n_runs = 7"),
            "should write commented n_runs"
        );
        assert!(
            contents.contains("# metric = \"correlation\""),
            "should write commented metric"
        );
        assert!(
            contents.contains("# permute_responses = false"),
            "should write commented permute_responses"
        );

        // the commented file parses back to defaults
        let again = AppConfig::load_or_default(&path_str);
        assert_eq!(again.regression, RegressionConfig::default());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let cfg: AppConfig = toml::from_str(
            "[rsa]\nscope = \"matrix\"\n[executor]\nseed = 42\n",
        )
        .unwrap();
        assert_eq!(cfg.rsa.scope, Scope::Matrix);
        assert_eq!(cfg.rsa.threshold, 0.01);
        assert_eq!(cfg.executor.seed, Some(42));
        assert_eq!(cfg.executor.workers, 6);
        assert_eq!(cfg.paths.featureset, "meangamma");
    }

    #[test]
    fn unparsable_file_falls_back_without_overwrite() {
        let path = unique_path("broken.toml");
        fs::write(&path, "[regression\nn_runs = ").unwrap();
        let cfg = AppConfig::load_or_default(&path.to_string_lossy());
        assert_eq!(cfg.regression.n_runs, 7);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[regression\nn_runs = ");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn validate_rejects_single_fold() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.regression.n_folds = 1;
        assert!(cfg.validate().is_err());
    }
}
