use thiserror::Error;

/// Every problem found in one request, reported together.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid input: {}", errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config in {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Curve-fit failures. Always recovered inside the models; only
/// `DegradationModel::fit_degradation_curve` hands one back to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("no convergence after {evaluations} evaluations")]
    NonConvergence { evaluations: usize },
    #[error("non-finite residuals")]
    NonFinite,
    #[error("singular normal equations")]
    Singular,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("simulation cancelled after {completed} iterations")]
    Cancelled { completed: usize },
    #[error("simulation deadline exceeded after {completed} iterations")]
    TimedOut { completed: usize },
    #[error("no drivers to simulate")]
    NoDrivers,
}
