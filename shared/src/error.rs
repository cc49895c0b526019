/*!
Common error types for the scan engine components.

Every failure that can cross a component boundary maps onto one of the wire
[`ErrorCode`]s, so the worker can report it as a result value instead of
propagating it.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, ScanError>;

/// Error codes surfaced at the engine, worker and fallback boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request, message or ROI
    InvalidRequest,
    /// Zero dimensions or a buffer that does not match them
    InvalidDimensions,
    /// Empty pixel buffer
    MissingImageData,
    /// Decode engine not initialized yet
    #[serde(rename = "WASM_NOT_READY")]
    NotReady,
    /// A reader faulted while processing the frame
    DecodeFailed,
    /// Transport-level failure (timeout, closed channel)
    RequestFailed,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidDimensions => "INVALID_DIMENSIONS",
            ErrorCode::MissingImageData => "MISSING_IMAGE_DATA",
            ErrorCode::NotReady => "WASM_NOT_READY",
            ErrorCode::DecodeFailed => "DECODE_FAILED",
            ErrorCode::RequestFailed => "REQUEST_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comprehensive error type for all scan operations
#[derive(Error, Debug)]
pub enum ScanError {
    /// Pixel buffer does not describe a width x height RGBA image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Region of interest does not fit inside the source image
    #[error("Invalid ROI: {0}")]
    InvalidRoi(String),

    /// Pixel buffer is empty
    #[error("Missing image data")]
    MissingImageData,

    /// Malformed request or settings
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Engine has not completed its readiness handshake
    #[error("Decode engine is not ready")]
    NotReady,

    /// A reader failed with an internal error
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// No response arrived within the request window
    #[error("Request {request_id} timed out after {timeout_ms} ms")]
    Timeout { request_id: u64, timeout_ms: u64 },

    /// The background context is gone or the channel closed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The background context reported an error code
    #[error("Worker error {code}: {message}")]
    Worker { code: ErrorCode, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ScanError {
    /// Create a new invalid image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new invalid ROI error
    pub fn invalid_roi(msg: impl Into<String>) -> Self {
        Self::InvalidRoi(msg.into())
    }

    /// Create a new invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new decode failure
    pub fn decode_failed(msg: impl Into<String>) -> Self {
        Self::DecodeFailed(msg.into())
    }

    /// Create a new transport failure
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Wire error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ScanError::InvalidImage(_) => ErrorCode::InvalidDimensions,
            ScanError::InvalidRoi(_) => ErrorCode::InvalidRequest,
            ScanError::MissingImageData => ErrorCode::MissingImageData,
            ScanError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ScanError::NotReady => ErrorCode::NotReady,
            ScanError::DecodeFailed(_) => ErrorCode::DecodeFailed,
            ScanError::Timeout { .. } => ErrorCode::RequestFailed,
            ScanError::RequestFailed(_) => ErrorCode::RequestFailed,
            ScanError::Worker { code, .. } => *code,
            ScanError::Serde(_) => ErrorCode::InvalidRequest,
        }
    }

    /// Whether retrying the same call (or reinitializing) may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.code(), ErrorCode::NotReady | ErrorCode::RequestFailed)
    }

    /// Whether the caller sent something malformed
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidRequest | ErrorCode::InvalidDimensions | ErrorCode::MissingImageData
        )
    }
}
