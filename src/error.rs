//! Error taxonomy shared by the RSA and regression-mapping pipelines.

use thiserror::Error;

/// Errors raised by the core pipelines and their I/O collaborators.
///
/// Degenerate correlation inputs are not represented here: they surface as
/// NaN and are canonicalized to 0.0 by the aggregation step.
#[derive(Debug, Error)]
pub enum CollusionError {
    /// Representation and response rows disagree (order or count).
    #[error("data alignment: {0}")]
    DataAlignment(String),

    /// Dimensionality reduction did not converge.
    #[error("eigen-decomposition did not converge after {sweeps} sweeps (off-diagonal {residual:.3e})")]
    ConvergenceFailure { sweeps: usize, residual: f64 },

    /// Operation not defined for this representation kind.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A required discriminating identifier was not supplied.
    #[error("missing argument: {0} is required for this mode")]
    MissingArgument(&'static str),

    /// Argument present but outside its valid domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed on-disk text grid or id list.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollusionError {
    pub fn alignment(message: impl Into<String>) -> Self {
        Self::DataAlignment(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Failures a single grid task absorbs as a zero-score skip.
    pub fn is_task_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConvergenceFailure { .. } | Self::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CollusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = CollusionError::MissingArgument("sid");
        assert_eq!(
            err.to_string(),
            "missing argument: sid is required for this mode"
        );

        let err = CollusionError::alignment("3 responses for 4 stimuli");
        assert!(err.to_string().contains("3 responses for 4 stimuli"));

        let err = CollusionError::parse("grid.txt", "row 2 has 3 columns, expected 4");
        assert!(err.to_string().starts_with("parse error in grid.txt"));
    }

    #[test]
    fn only_convergence_and_argument_errors_are_recoverable() {
        let conv = CollusionError::ConvergenceFailure {
            sweeps: 10,
            residual: 1e-3,
        };
        assert!(conv.is_task_recoverable());
        assert!(CollusionError::invalid("2 folds for 1 sample").is_task_recoverable());
        assert!(!CollusionError::alignment("mismatch").is_task_recoverable());
        assert!(!CollusionError::unsupported("load").is_task_recoverable());
    }

    #[test]
    fn io_errors_convert() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(CollusionError::Io(_))));
    }
}
