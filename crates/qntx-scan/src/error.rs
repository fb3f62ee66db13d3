//! Error types for frame scanning
//!
//! None of these cross the per-frame entry point: `ScanEngine::process_frame`
//! logs them and reports an empty result instead.

use thiserror::Error;

use crate::types::Variant;

/// Errors raised while processing a single frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The source buffer could not be read (already released, or shorter
    /// than its declared geometry)
    #[error("source buffer unavailable: {0}")]
    SourceUnavailable(String),

    /// Pixel layout not recognized
    #[error("unsupported frame format: {0}")]
    UnsupportedFormat(String),

    /// Frame exceeds the configured pixel limit
    #[error("frame of {pixels} pixels exceeds limit of {limit}")]
    TooLarge { pixels: u64, limit: u64 },

    /// The detector failed on one variant
    #[error("detector failed on {variant}: {source}")]
    Detector {
        variant: Variant,
        #[source]
        source: DetectorError,
    },

    /// A scratch buffer could not grow
    #[error("scratch allocation of {requested} elements failed")]
    ScratchAllocation { requested: usize },
}

/// Failure reported by the external detector for one call.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    /// Detector is not ready to accept frames
    #[error("detector not ready")]
    NotReady,

    /// Image layout the detector cannot consume
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Detector failed internally
    #[error("detection failed: {0}")]
    Failed(String),

    /// Detector panicked during the call
    #[error("detector panicked: {0}")]
    Panicked(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type alias for frame processing
pub type Result<T> = std::result::Result<T, FrameError>;
