use thiserror::Error;

/// Errors that can occur while building or evaluating an interpolant
#[derive(Debug, Error)]
pub enum Error {
    /// Point is not on the manifold
    #[error("point not on manifold: {0}")]
    NotOnManifold(String),

    /// Dimension mismatch
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Logarithm argument left the principal branch by more than the tolerance
    #[error("logarithm off the principal branch: residue {residue:e} above {tolerance:e}")]
    BranchCut { residue: f64, tolerance: f64 },

    /// Local kernel system is singular, ill-conditioned or empty
    #[error("degenerate kernel system at ({x}, {y}): {reason}")]
    DegenerateSystem { x: f64, y: f64, reason: String },

    /// Iterative weight solve stopped above its residual tolerance
    #[error("weight solve stopped after {iterations} iterations at residual {residual:e}")]
    NotConverged {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },

    /// No sample point has a non-zero kernel value at the query
    #[error("no sample points within the kernel support of ({x}, {y})")]
    EmptyNeighborhood { x: f64, y: f64 },

    /// Invalid parameter value
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Name lookup failed in one of the registries
    #[error("unknown {registry} '{name}'")]
    UnknownName { registry: &'static str, name: String },

    /// Persisted weight cache could not be decoded or encoded
    #[error("weight cache: {0}")]
    Cache(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type for manifold and interpolation operations
pub type Result<T> = std::result::Result<T, Error>;
