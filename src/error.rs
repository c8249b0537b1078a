//! Error types for trace denoising and burst detection

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, TraceError>;

/// Everything that can go wrong while processing a trace, a batch or a file.
///
/// Variants up to `Cancelled` can end a single cell; the batch driver catches
/// them, logs the cell index and marks the row as failed.
#[derive(Error, Debug)]
pub enum TraceError {
    /// Trace is empty, not 1-D, or otherwise unusable
    #[error("Invalid input shape: {0}")]
    InvalidInputShape(String),

    /// Baseline estimator failed to converge or could not be solved
    #[error("Baseline fit failed: {0}")]
    BaselineFit(String),

    /// Baseline is zero (or within tolerance of zero) where dF/F is computed
    #[error("Degenerate baseline at frame {index}: {value}")]
    DegenerateBaseline { index: usize, value: f64 },

    /// Spike deconvolution could not produce a result
    #[error("Deconvolution failed: {0}")]
    Deconvolution(String),

    /// Per-cell time budget ran out
    #[error("Cell processing exceeded {limit_ms} ms")]
    TimedOut { limit_ms: u64 },

    /// Batch was cancelled from outside
    #[error("Processing cancelled")]
    Cancelled,

    /// Malformed or unsupported .npy file
    #[error("NPY format error: {0}")]
    NpyFormat(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Table construction error
    #[error("Table error: {0}")]
    Table(#[from] polars::error::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
