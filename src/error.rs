//! Error types for display scheduling.
//!
//! Every failure a control command can produce maps to one of these
//! variants. None of them alter scheduler state; they are logged and turned
//! into a status string by the control layer.

use std::path::PathBuf;
use thiserror::Error;

/// Domain error for the display pipeline.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// Exact and fuzzy resolution both missed.
    #[error("asset not found: {logical}")]
    AssetNotFound {
        /// Logical path as requested by the caller.
        logical: String,
    },

    /// The file exists but cannot be shown.
    #[error("unsupported asset {}: {reason}", path.display())]
    UnsupportedAsset {
        /// Resolved (or requested) path.
        path: PathBuf,
        /// Why the asset was rejected.
        reason: &'static str,
    },

    /// A parameter could not be parsed. The control layer substitutes the
    /// documented default instead of failing the request.
    #[error("invalid parameter {name}={value}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Raw value received.
        value: String,
    },

    /// The presentation surface is not initialised yet.
    #[error("presentation surface unavailable")]
    SurfaceUnavailable,

    /// Prevented by the scheduler lock; never expected at runtime.
    #[error("concurrent state mutation detected: {0}")]
    ConcurrencyViolation(&'static str),
}

/// Result alias for display operations.
pub type DisplayResult<T> = Result<T, DisplayError>;
