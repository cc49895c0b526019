/*!
Hints passed from the orchestrator to every reader.
*/

use shared::{FormatSet, Symbology};

/// Per-attempt reader hints
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeHints {
    /// Symbologies the caller accepts
    pub possible_formats: FormatSet,
    /// Scan more rows, both directions; slower but finds more
    pub try_harder: bool,
}

impl DecodeHints {
    pub fn new(possible_formats: FormatSet, try_harder: bool) -> Self {
        Self {
            possible_formats,
            try_harder,
        }
    }

    /// Whether a reader may report `format`
    pub fn accepts(&self, format: Symbology) -> bool {
        self.possible_formats.includes(format)
    }

    /// Whether any of `formats` is acceptable
    pub fn accepts_any(&self, formats: &[Symbology]) -> bool {
        formats.iter().any(|f| self.accepts(*f))
    }
}

impl Default for DecodeHints {
    fn default() -> Self {
        Self::new(FormatSet::all(), true)
    }
}
