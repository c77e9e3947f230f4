//! Central error types for gifsnap.
//!
//! Errors fall into three groups:
//! - configuration problems reported synchronously from `start`
//!   (`InvalidRegion`, `TargetUnavailable`, `ConfigError`)
//! - resource failures that end the active session (`GpuError`,
//!   `GpuDeviceLost`, `CaptureError`)
//! - encoding sink failures (`EncoderError`, `StorageError`)

use thiserror::Error;

/// Main error type for gifsnap operations.
#[derive(Error, Debug)]
pub enum GifSnapError {
    /// The requested capture region is empty or malformed
    #[error("Invalid capture region: {0}")]
    InvalidRegion(String),

    /// The capture target cannot be captured
    #[error("Capture target unavailable: {0}")]
    TargetUnavailable(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Capture source failed to open or start
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// GPU surface allocation or copy failed
    #[error("GPU error: {0}")]
    GpuError(String),

    /// GPU device lost (requires re-initialization)
    #[error("GPU device lost: {0}")]
    GpuDeviceLost(String),

    /// Encoding sink failed
    #[error("Encoder error: {0}")]
    EncoderError(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl GifSnapError {
    /// Errors raised before a session exists; the controller stays idle.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GifSnapError::InvalidRegion(_)
                | GifSnapError::TargetUnavailable(_)
                | GifSnapError::ConfigError(_)
        )
    }

    /// GPU and capture failures after which a session cannot continue.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            GifSnapError::GpuError(_) | GifSnapError::GpuDeviceLost(_) | GifSnapError::CaptureError(_)
        )
    }
}

impl From<gifski::Error> for GifSnapError {
    fn from(err: gifski::Error) -> Self {
        GifSnapError::EncoderError(err.to_string())
    }
}

/// Type alias for Results using GifSnapError.
pub type GifSnapResult<T> = Result<T, GifSnapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GifSnapError::GpuError("copy failed".to_string());
        assert_eq!(err.to_string(), "GPU error: copy failed");

        let err = GifSnapError::InvalidRegion("0x0".to_string());
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GifSnapError = io_err.into();
        assert!(matches!(err, GifSnapError::StorageError(_)));
    }

    #[test]
    fn test_error_classification() {
        assert!(GifSnapError::InvalidRegion(String::new()).is_configuration());
        assert!(GifSnapError::TargetUnavailable(String::new()).is_configuration());
        assert!(!GifSnapError::GpuError(String::new()).is_configuration());

        assert!(GifSnapError::GpuError(String::new()).is_resource_failure());
        assert!(GifSnapError::GpuDeviceLost(String::new()).is_resource_failure());
        assert!(!GifSnapError::EncoderError(String::new()).is_resource_failure());
    }
}
