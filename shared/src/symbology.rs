/*!
Symbology tags, reader groups and scan priorities.

This module defines the shared format enumeration every reader maps its own
identifiers onto, plus the [`FormatSet`] whitelist used to enable or disable
formats.
*/

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Reader group a symbology belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbologyGroup {
    /// One-dimensional bar/space codes
    Linear,
    /// Two-dimensional module grids
    Matrix,
}

/// Supported barcode/2D-code encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbology {
    #[serde(rename = "EAN_13")]
    Ean13,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "UPC_A")]
    UpcA,
    #[serde(rename = "CODE_128")]
    Code128,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "QR_CODE")]
    QrCode,
}

impl Symbology {
    /// Every symbology, in registry order (linear first)
    pub const ALL: [Symbology; 6] = [
        Symbology::Ean13,
        Symbology::UpcA,
        Symbology::Ean8,
        Symbology::Code128,
        Symbology::Code39,
        Symbology::QrCode,
    ];

    /// Parse symbology from its wire name (case-insensitive, '-' or '_')
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "EAN_13" | "EAN13" => Some(Self::Ean13),
            "EAN_8" | "EAN8" => Some(Self::Ean8),
            "UPC_A" | "UPCA" => Some(Self::UpcA),
            "CODE_128" | "CODE128" => Some(Self::Code128),
            "CODE_39" | "CODE39" => Some(Self::Code39),
            "QR_CODE" | "QR" | "QRCODE" => Some(Self::QrCode),
            _ => None,
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ean13 => "EAN_13",
            Self::Ean8 => "EAN_8",
            Self::UpcA => "UPC_A",
            Self::Code128 => "CODE_128",
            Self::Code39 => "CODE_39",
            Self::QrCode => "QR_CODE",
        }
    }

    /// Group this symbology is read by
    pub fn group(&self) -> SymbologyGroup {
        match self {
            Self::QrCode => SymbologyGroup::Matrix,
            _ => SymbologyGroup::Linear,
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Symbology {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| ScanError::invalid_request(format!("unknown symbology '{}'", s)))
    }
}

/// Which reader subset a decode call uses.
///
/// Wire values: 0 = Auto, 1 = Linear, 2 = Matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScanPriority {
    /// All readers, linear first
    #[default]
    Auto,
    /// Linear readers only
    Linear,
    /// Matrix readers only
    Matrix,
}

impl ScanPriority {
    /// Whether readers of `group` take part in this priority
    pub fn includes(&self, group: SymbologyGroup) -> bool {
        match self {
            ScanPriority::Auto => true,
            ScanPriority::Linear => group == SymbologyGroup::Linear,
            ScanPriority::Matrix => group == SymbologyGroup::Matrix,
        }
    }

    /// Parse a priority from a CLI-style name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "0" => Some(Self::Auto),
            "linear" | "1d" | "1" => Some(Self::Linear),
            "matrix" | "2d" | "2" => Some(Self::Matrix),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ScanPriority {
    type Error = ScanError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScanPriority::Auto),
            1 => Ok(ScanPriority::Linear),
            2 => Ok(ScanPriority::Matrix),
            other => Err(ScanError::invalid_request(format!(
                "unknown scan priority {}",
                other
            ))),
        }
    }
}

impl From<ScanPriority> for u8 {
    fn from(priority: ScanPriority) -> Self {
        match priority {
            ScanPriority::Auto => 0,
            ScanPriority::Linear => 1,
            ScanPriority::Matrix => 2,
        }
    }
}

/// Whitelist of enabled symbologies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatSet {
    formats: BTreeSet<Symbology>,
}

impl FormatSet {
    /// Create a whitelist from a list of wire names; unknown names are rejected
    pub fn new(names: &[&str]) -> Result<Self, ScanError> {
        let formats = names
            .iter()
            .map(|name| name.parse::<Symbology>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self { formats })
    }

    /// Create a whitelist with all available formats
    pub fn all() -> Self {
        Self {
            formats: Symbology::ALL.into_iter().collect(),
        }
    }

    /// Create an empty whitelist
    pub fn empty() -> Self {
        Self {
            formats: BTreeSet::new(),
        }
    }

    /// Check if a format should be decoded
    pub fn includes(&self, format: Symbology) -> bool {
        self.formats.contains(&format)
    }

    /// Enable a format
    pub fn insert(&mut self, format: Symbology) {
        self.formats.insert(format);
    }

    /// Formats present in both sets
    pub fn intersection(&self, other: &FormatSet) -> FormatSet {
        Self {
            formats: self.formats.intersection(&other.formats).copied().collect(),
        }
    }

    /// Iterate over the enabled formats in enum order
    pub fn iter(&self) -> impl Iterator<Item = Symbology> + '_ {
        self.formats.iter().copied()
    }

    /// Number of enabled formats
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Check if no format is enabled
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl Default for FormatSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<Symbology> for FormatSet {
    fn from_iter<I: IntoIterator<Item = Symbology>>(iter: I) -> Self {
        Self {
            formats: iter.into_iter().collect(),
        }
    }
}
