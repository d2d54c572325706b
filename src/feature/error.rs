//! Error type of the feature finder.

use crate::params::ParamError;

/// Errors that can occur during feature finding
#[derive(Debug, thiserror::Error)]
pub enum FeatureFinderError {
    /// A configuration value (or combination) is invalid
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Error from the parameter registry
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    /// Aggregate query on an empty trace list (programmer error)
    #[error("Precondition violated: {0}")]
    Precondition(&'static str),

    /// The caller requested cancellation; partial output was discarded
    #[error("Run cancelled")]
    Cancelled,
}
