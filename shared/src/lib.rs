/*!
# Shared Types and Utilities

This crate contains the types shared between the decode engine, the background
worker and the request router of the optical-code scan engine.

## Core Types

- [`Frame`] - Immutable RGBA camera frame with capture instant
- [`Roi`] / [`Point`] - Pixel-space geometry
- [`Symbology`] / [`ScanPriority`] - Format tags and reader selection
- [`DecodeResult`] / [`DecodeOutcome`] - What a decode attempt produced

## Modules

- [`protocol`] - Worker message envelopes
- [`capabilities`] - Capability advertisement and settings negotiation
- [`error`] - Common error types and wire error codes
*/

pub mod capabilities;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod protocol;
pub mod result;
pub mod symbology;

// Re-export commonly used types
pub use capabilities::{EngineCapabilities, ScanSettings, SymbologyCapability};
pub use error::{ErrorCode, Result, ScanError};
pub use frame::{monotonic_ms, Frame};
pub use geometry::{Point, Roi, DEFAULT_CENTER_FRACTION};
pub use protocol::{WorkerRequest, WorkerResponse};
pub use result::{CacheStats, DecodeOptions, DecodeOutcome, DecodeResult, FIXED_CONFIDENCE};
pub use symbology::{FormatSet, ScanPriority, Symbology, SymbologyGroup};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod defaults {
    /// Deduplication cooldown window in milliseconds
    pub const COOLDOWN_MS: u64 = 1500;

    /// Readiness handshake timeout in milliseconds
    pub const INIT_TIMEOUT_MS: u64 = 10_000;

    /// Per-decode response timeout in milliseconds
    pub const DECODE_TIMEOUT_MS: u64 = 1000;

    /// Timeout for non-decode correlated requests in milliseconds
    pub const REQUEST_TIMEOUT_MS: u64 = 2000;
}
