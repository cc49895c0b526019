/*!
Capability advertisement and settings negotiation types.

The engine advertises which symbologies it can read and the settings it
currently runs with; callers send a [`ScanSettings`] request that the engine
validates against those capabilities.
*/

use crate::symbology::{FormatSet, Symbology, SymbologyGroup};
use serde::{Deserialize, Serialize};

/// One readable symbology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbologyCapability {
    pub format: Symbology,
    pub group: SymbologyGroup,
}

impl From<Symbology> for SymbologyCapability {
    fn from(format: Symbology) -> Self {
        Self {
            format,
            group: format.group(),
        }
    }
}

/// What the engine can read and how it is configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCapabilities {
    /// Engine crate version
    pub version: String,
    /// Symbologies a registered reader can produce, in registry order
    pub symbologies: Vec<SymbologyCapability>,
    /// Symbologies currently enabled
    pub enabled_formats: FormatSet,
    /// Deduplication cooldown in milliseconds
    pub cooldown_ms: u64,
    /// Whether readers trade latency for recall
    pub try_harder: bool,
    /// Share of each dimension used for the default linear ROI
    pub center_fraction: f32,
}

impl EngineCapabilities {
    /// Whether some registered reader produces `format`
    pub fn supports(&self, format: Symbology) -> bool {
        self.symbologies.iter().any(|cap| cap.format == format)
    }
}

/// Requested settings; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    /// Wire names of the formats to enable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_formats: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub try_harder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_fraction: Option<f32>,
}

impl ScanSettings {
    /// Whether the request changes anything
    pub fn is_empty(&self) -> bool {
        self.enabled_formats.is_none()
            && self.cooldown_ms.is_none()
            && self.try_harder.is_none()
            && self.center_fraction.is_none()
    }
}
