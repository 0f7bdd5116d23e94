//! Centralized error handling for obsbin
//!
//! Every fallible operation in the crate returns [`ObsBinError`]. The variants
//! carry the offending names so callers (and the CLI) can report exactly what
//! went wrong, and [`ObsBinError::category`] groups them into the broad
//! classes a caller usually branches on.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for obsbin operations
#[derive(Debug, Error)]
pub enum ObsBinError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Bad dimension definition or dimension string
    #[error("Invalid dimension '{spec}': {reason}")]
    InvalidDimension { spec: String, reason: String },

    /// Bad diagnostic definition or diagnostic string
    #[error("Invalid diagnostic '{spec}': {reason}")]
    InvalidDiagnostic { spec: String, reason: String },

    /// Bad filter arguments or filter string
    #[error("Invalid filter '{spec}': {reason}")]
    InvalidFilter { spec: String, reason: String },

    /// Statistic name is not in the registry
    #[error("Statistic '{name}' does not exist")]
    UnknownStatistic { name: String },

    /// Filter name is not in the registry
    #[error("Cannot create filter '{name}', it has not been registered")]
    UnknownFilter { name: String },

    /// Filter name registered twice
    #[error("Cannot register filter '{name}', it has already been registered")]
    DuplicateFilter { name: String },

    /// A statistic was calculated or merged before one of its dependencies
    #[error("Statistic '{field}' depends on '{dependency}', but it has not been calculated yet")]
    MissingDependency { field: String, dependency: String },

    /// A non-global statistic was calculated or merged twice on one grid
    #[error("Statistic '{field}' has already been calculated")]
    AlreadyComputed { field: String },

    /// A statistic value was requested that is not stored in the grid
    #[error("Statistic '{field}' has not been calculated")]
    NotComputed { field: String },

    /// A derived statistic was asked to bin or merge
    #[error("Statistic '{name}' is derived and has no calc() or merge()")]
    NotComputable { name: String },

    /// Input field required for binning is absent
    #[error("Field '{field}' is missing from the unbinned data")]
    MissingField { field: String },

    /// Input field has more than two dimensions
    #[error("Field '{field}' has an unsupported {ndim} dimensions (at most 2 are allowed)")]
    UnsupportedRank { field: String, ndim: usize },

    /// Array shapes disagree
    #[error("Shape mismatch for '{field}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Variable binned twice into the same container
    #[error("Cannot bin variable '{var}', it already exists")]
    VariableExists { var: String },

    /// Variable not found in a binned statistics container
    #[error("Variable '{var}' not found")]
    VariableNotFound { var: String },

    /// Diagnostic not found in a binned statistics container
    #[error("Diagnostic '{diag}' not found")]
    DiagnosticNotFound { diag: String },

    /// Dimension not found in the binning
    #[error("Dimension '{dim}' not found in the binning")]
    DimensionNotFound { dim: String },

    /// Coordinate value outside every bin of a dimension
    #[error("Value {value} lies outside the bins of dimension '{dim}'")]
    CoordinateOutOfRange { dim: String, value: f64 },

    /// Output file exists and overwrite was not requested
    #[error("Output file '{}' already exists", path.display())]
    FileExists { path: PathBuf },

    /// Persisted file does not follow the binned statistics layout
    #[error("Invalid binned statistics file '{}': {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },

    /// Two binned statistics cannot be combined
    #[error("Binned statistics are not equivalent: {0}")]
    NotEquivalent(String),

    /// Operation declared but not available
    #[error("'{0}' is not yet implemented")]
    Unsupported(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Generic error for backward compatibility
    #[error("{0}")]
    Generic(String),
}

/// Broad classes of failure, used to decide how to report an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad construction arguments, reported immediately
    Configuration,
    /// Statistic evaluation order violated
    Dependency,
    /// Missing input fields, wrong ranks, unknown names
    DataShape,
    /// Something already exists
    Conflict,
    /// A requested result is not available
    MissingResult,
    /// File or library level I/O
    Io,
    /// Everything else
    Internal,
}

impl ObsBinError {
    /// Map this error onto its [`ErrorCategory`]
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDimension { .. }
            | Self::InvalidDiagnostic { .. }
            | Self::InvalidFilter { .. }
            | Self::UnknownFilter { .. }
            | Self::DuplicateFilter { .. }
            | Self::ThreadPoolError(_) => ErrorCategory::Configuration,
            Self::MissingDependency { .. }
            | Self::AlreadyComputed { .. }
            | Self::NotComputable { .. } => ErrorCategory::Dependency,
            Self::UnknownStatistic { .. }
            | Self::MissingField { .. }
            | Self::UnsupportedRank { .. }
            | Self::ShapeMismatch { .. }
            | Self::VariableNotFound { .. }
            | Self::DiagnosticNotFound { .. }
            | Self::DimensionNotFound { .. }
            | Self::CoordinateOutOfRange { .. }
            | Self::NotEquivalent(_)
            | Self::ArrayError(_) => ErrorCategory::DataShape,
            Self::VariableExists { .. } | Self::FileExists { .. } => ErrorCategory::Conflict,
            Self::NotComputed { .. } => ErrorCategory::MissingResult,
            Self::NetCDFError(_) | Self::IoError(_) | Self::InvalidFile { .. } => {
                ErrorCategory::Io
            }
            Self::Unsupported(_) | Self::Generic(_) => ErrorCategory::Internal,
        }
    }
}

impl From<String> for ObsBinError {
    fn from(error: String) -> Self {
        ObsBinError::Generic(error)
    }
}

impl From<&str> for ObsBinError {
    fn from(error: &str) -> Self {
        ObsBinError::Generic(error.to_string())
    }
}

/// Result type alias for obsbin operations
pub type Result<T> = std::result::Result<T, ObsBinError>;
