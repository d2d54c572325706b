//! Error type of the deconvolution engine.

use crate::params::ParamError;

/// Errors that can occur during deconvolution
#[derive(Debug, thiserror::Error)]
pub enum DeconvError {
    /// A configuration value (or combination) is invalid
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Error from the parameter registry
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    /// Error writing the TSV report
    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    /// I/O error while writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
