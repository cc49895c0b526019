/*!
# Format Readers

Every symbology family sits behind the [`FormatReader`] trait. The
[`ReaderRegistry`] holds them in a fixed order and hands out the subset that
matches a [`ScanPriority`]: linear readers first, matrix readers after,
registration order within each group.
*/

use crate::hints::DecodeHints;
use image::GrayImage;
use shared::{Point, ScanPriority, Symbology, SymbologyGroup};
use thiserror::Error;

pub mod code128;
pub mod code39;
pub mod oned;
pub mod qr;
pub mod upc_ean;

pub use code128::Code128Reader;
pub use code39::Code39Reader;
pub use qr::QrReader;
pub use upc_ean::UpcEanReader;

/// A reader's raw match, in the coordinates of the image it was given
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderMatch {
    pub text: String,
    pub format: Symbology,
    pub points: Vec<Point>,
}

impl ReaderMatch {
    pub fn new(text: impl Into<String>, format: Symbology, points: Vec<Point>) -> Self {
        Self {
            text: text.into(),
            format,
            points,
        }
    }
}

/// Failures a reader can report besides "nothing here"
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReaderError {
    /// A symbol was located but its check value did not verify
    #[error("Checksum mismatch: {0}")]
    Checksum(String),

    /// A symbol was located but its content could not be interpreted
    #[error("Format error: {0}")]
    Format(String),

    /// The reader itself failed
    #[error("Reader fault: {0}")]
    Fault(String),
}

impl ReaderError {
    pub fn checksum(msg: impl Into<String>) -> Self {
        Self::Checksum(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    /// Whether the failure is in the reader rather than the symbol
    pub fn is_fault(&self) -> bool {
        matches!(self, ReaderError::Fault(_))
    }
}

/// One symbology family
pub trait FormatReader: Send + Sync {
    /// Family name for logs
    fn name(&self) -> &'static str;

    /// Group used for priority partitioning
    fn group(&self) -> SymbologyGroup;

    /// Symbologies this reader can produce
    fn symbologies(&self) -> &'static [Symbology];

    /// Look for one symbol. `Ok(None)` means nothing was found.
    fn decode(
        &self,
        image: &GrayImage,
        hints: &DecodeHints,
    ) -> Result<Option<ReaderMatch>, ReaderError>;
}

/// Ordered set of readers
#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn FormatReader>>,
}

impl ReaderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Every shipped reader: UPC/EAN, Code 128, Code 39, QR
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(UpcEanReader::new()));
        registry.register(Box::new(Code128Reader::new()));
        registry.register(Box::new(Code39Reader::new()));
        registry.register(Box::new(QrReader::new()));
        registry
    }

    /// Append a reader
    pub fn register(&mut self, reader: Box<dyn FormatReader>) {
        self.readers.push(reader);
    }

    /// Readers to try for `priority`, in attempt order
    pub fn select(&self, priority: ScanPriority) -> Vec<&dyn FormatReader> {
        let mut selected = Vec::with_capacity(self.readers.len());
        for group in [SymbologyGroup::Linear, SymbologyGroup::Matrix] {
            if !priority.includes(group) {
                continue;
            }
            selected.extend(
                self.readers
                    .iter()
                    .filter(|reader| reader.group() == group)
                    .map(|reader| reader.as_ref()),
            );
        }
        selected
    }

    /// Every symbology some reader produces, in attempt order, without repeats
    pub fn symbologies(&self) -> Vec<Symbology> {
        let mut out: Vec<Symbology> = Vec::new();
        for reader in self.select(ScanPriority::Auto) {
            for &format in reader.symbologies() {
                if !out.contains(&format) {
                    out.push(format);
                }
            }
        }
        out
    }

    /// Number of registered readers
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Check if no reader is registered
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.readers.iter().map(|r| r.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_order() {
        let registry = ReaderRegistry::standard();
        assert_eq!(registry.len(), 4);

        let names: Vec<_> = registry
            .select(ScanPriority::Auto)
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(names, vec!["upc_ean", "code128", "code39", "qr"]);
        assert_eq!(registry.symbologies(), Symbology::ALL.to_vec());
    }

    #[test]
    fn test_priority_partitions_readers() {
        let registry = ReaderRegistry::standard();

        let linear = registry.select(ScanPriority::Linear);
        assert_eq!(linear.len(), 3);
        assert!(linear.iter().all(|r| r.group() == SymbologyGroup::Linear));

        let matrix = registry.select(ScanPriority::Matrix);
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].name(), "qr");
    }

    #[test]
    fn test_matrix_registered_first_still_tried_last() {
        let mut registry = ReaderRegistry::new();
        registry.register(Box::new(QrReader::new()));
        registry.register(Box::new(Code39Reader::new()));

        let names: Vec<_> = registry
            .select(ScanPriority::Auto)
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(names, vec!["code39", "qr"]);
    }
}
