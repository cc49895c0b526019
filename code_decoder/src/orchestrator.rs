/*!
Decode orchestration: pick the reader subset for a priority, build hints, and
take the first reader that finds something.
*/

use crate::hints::DecodeHints;
use crate::readers::{ReaderError, ReaderRegistry};
use image::GrayImage;
use shared::{DecodeResult, FormatSet, Result, ScanError, ScanPriority};
use tracing::{debug, warn};

/// Runs registered readers in order over one grayscale image
#[derive(Debug)]
pub struct DecodeOrchestrator {
    registry: ReaderRegistry,
    enabled_formats: FormatSet,
    try_harder: bool,
}

impl DecodeOrchestrator {
    pub fn new(registry: ReaderRegistry, enabled_formats: FormatSet, try_harder: bool) -> Self {
        Self {
            registry,
            enabled_formats,
            try_harder,
        }
    }

    pub fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    /// Replace the enabled formats and try-harder flag
    pub fn configure(&mut self, enabled_formats: FormatSet, try_harder: bool) {
        self.enabled_formats = enabled_formats;
        self.try_harder = try_harder;
    }

    /// Hints for `priority`: the subset's symbologies that are also enabled
    pub fn hints_for(&self, priority: ScanPriority) -> DecodeHints {
        let possible = self
            .registry
            .select(priority)
            .iter()
            .flat_map(|reader| reader.symbologies().iter().copied())
            .filter(|format| self.enabled_formats.includes(*format))
            .collect();
        DecodeHints::new(possible, self.try_harder)
    }

    /// Decode one image.
    ///
    /// `Ok(None)` when every reader came up empty. Corner points are in the
    /// coordinates of `image`; `timestamp` is copied into the result.
    pub fn decode(
        &self,
        image: &GrayImage,
        priority: ScanPriority,
        timestamp: u64,
    ) -> Result<Option<DecodeResult>> {
        let hints = self.hints_for(priority);
        if hints.possible_formats.is_empty() {
            debug!("No enabled formats for priority {:?}", priority);
            return Ok(None);
        }

        let mut fault: Option<ReaderError> = None;
        for reader in self.registry.select(priority) {
            if !hints.accepts_any(reader.symbologies()) {
                continue;
            }

            match reader.decode(image, &hints) {
                Ok(Some(found)) => {
                    debug!("{} matched {} ({})", reader.name(), found.text, found.format);
                    return Ok(Some(DecodeResult::new(
                        found.text,
                        found.format,
                        found.points,
                        timestamp,
                    )));
                }
                Ok(None) => {}
                Err(err) if err.is_fault() => {
                    warn!("⚠️ Reader {} failed: {}", reader.name(), err);
                    fault = Some(err);
                }
                Err(err) => {
                    debug!("{} found no valid symbol: {}", reader.name(), err);
                }
            }
        }

        match fault {
            Some(err) => Err(ScanError::decode_failed(err.to_string())),
            None => Ok(None),
        }
    }
}
