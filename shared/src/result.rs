/*!
Decode results and per-call options.
*/

use crate::geometry::{Point, Roi};
use crate::symbology::{ScanPriority, Symbology};
use serde::{Deserialize, Serialize};

/// Confidence reported for every successful decode.
///
/// None of the integrated readers exposes a native score.
pub const FIXED_CONFIDENCE: f32 = 1.0;

/// A recognized code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    /// Decoded payload
    pub text: String,
    /// Symbology the payload was read from
    pub format: Symbology,
    /// Boundary points in source-frame pixels, possibly empty
    pub corner_points: Vec<Point>,
    /// Always [`FIXED_CONFIDENCE`] for now
    pub confidence: f32,
    /// Monotonic capture time in milliseconds.
    ///
    /// The wire format carries no capture time, so results decoded through
    /// the worker carry the instant the worker received the frame.
    pub timestamp: u64,
}

impl DecodeResult {
    /// Create a result with the fixed confidence
    pub fn new(
        text: impl Into<String>,
        format: Symbology,
        corner_points: Vec<Point>,
        timestamp: u64,
    ) -> Self {
        Self {
            text: text.into(),
            format,
            corner_points,
            confidence: FIXED_CONFIDENCE,
            timestamp,
        }
    }

    /// Deduplication key: (payload, format)
    pub fn key(&self) -> (String, Symbology) {
        (self.text.clone(), self.format)
    }
}

/// Optional per-call decode options
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeOptions {
    /// Explicit region of interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<Roi>,
    /// Reader subset; Auto when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<ScanPriority>,
}

impl DecodeOptions {
    /// Options with only a priority set
    pub fn with_priority(priority: ScanPriority) -> Self {
        Self {
            roi: None,
            priority: Some(priority),
        }
    }

    /// Options with only a region set
    pub fn with_roi(roi: Roi) -> Self {
        Self {
            roi: Some(roi),
            priority: None,
        }
    }

    /// Effective priority
    pub fn priority(&self) -> ScanPriority {
        self.priority.unwrap_or_default()
    }
}

/// Non-error outcome of one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A new code was recognized
    Found(DecodeResult),
    /// The code was recognized but suppressed by the cooldown
    Duplicate,
    /// No code present in the frame
    NotFound,
}

impl DecodeOutcome {
    /// The result, if a new code was found
    pub fn result(&self) -> Option<&DecodeResult> {
        match self {
            DecodeOutcome::Found(result) => Some(result),
            _ => None,
        }
    }

    /// Whether this is a suppressed repeat
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DecodeOutcome::Duplicate)
    }
}

/// Deduplication cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries currently held, including expired ones not yet swept
    pub cache_size: usize,
    /// Cooldown window in milliseconds
    pub cooldown_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_wire_shape() {
        let result = DecodeResult::new(
            "12345670",
            Symbology::Ean8,
            vec![Point::new(10.0, 5.0), Point::new(90.0, 5.0)],
            42,
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["text"], "12345670");
        assert_eq!(json["format"], "EAN_8");
        assert_eq!(json["confidence"], 1.0);
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["cornerPoints"][1]["x"], 90.0);
    }

    #[test]
    fn test_options_defaults() {
        let options: DecodeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.priority(), ScanPriority::Auto);
        assert!(options.roi.is_none());

        let options: DecodeOptions =
            serde_json::from_str(r#"{"roi":{"x":1,"y":2,"width":3,"height":4},"priority":1}"#)
                .unwrap();
        assert_eq!(options.roi, Some(Roi::new(1, 2, 3, 4)));
        assert_eq!(options.priority(), ScanPriority::Linear);
    }
}
