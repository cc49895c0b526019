/*!
Code 39 reader. `*` frames the symbol; no check digit is assumed.
*/

use super::oned::{self, RowDecoder, RowMatch};
use super::{FormatReader, ReaderError, ReaderMatch};
use crate::hints::DecodeHints;
use crate::scanline::RowRuns;
use image::GrayImage;
use shared::{Symbology, SymbologyGroup};

pub(crate) const ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-. $/+%";

/// Wide/narrow masks, first element in the high bit; bars and spaces alternate
pub(crate) const CHARACTER_ENCODINGS: [u16; 43] = [
    0x034, 0x121, 0x061, 0x160, 0x031, 0x130, 0x070, 0x025, 0x124, 0x064, // 0-9
    0x109, 0x049, 0x148, 0x019, 0x118, 0x058, 0x00D, 0x10C, 0x04C, 0x01C, // A-J
    0x103, 0x043, 0x142, 0x013, 0x112, 0x052, 0x007, 0x106, 0x046, 0x016, // K-T
    0x181, 0x0C1, 0x1C0, 0x091, 0x190, 0x0D0, 0x085, 0x184, 0x0C4, 0x0A8, // U-$
    0x0A2, 0x08A, 0x02A, // /-%
];

pub(crate) const ASTERISK_ENCODING: u16 = 0x094;

/// Runs per character, excluding the inter-character gap
const CHARACTER_RUNS: usize = 9;

const SYMBOLOGIES: [Symbology; 1] = [Symbology::Code39];

/// Classify nine run widths into a wide/narrow mask.
///
/// Exactly three elements must be wide, and no wide element may account for
/// half of the total wide width.
fn to_narrow_wide(counters: &[u32]) -> Option<u16> {
    let count = counters.len();
    let mut max_narrow = 0u32;

    loop {
        let min_counter = counters
            .iter()
            .copied()
            .filter(|&c| c > max_narrow)
            .min()?;
        max_narrow = min_counter;

        let mut wide_count = 0;
        let mut total_wide = 0u32;
        let mut pattern = 0u16;
        for (i, &counter) in counters.iter().enumerate() {
            if counter > max_narrow {
                pattern |= 1 << (count - 1 - i);
                wide_count += 1;
                total_wide += counter;
            }
        }

        if wide_count == 3 {
            let balanced = counters
                .iter()
                .filter(|&&c| c > max_narrow)
                .all(|&c| c * 2 < total_wide);
            return balanced.then_some(pattern);
        }
        if wide_count < 3 {
            return None;
        }
    }
}

fn pattern_to_char(pattern: u16) -> Option<char> {
    CHARACTER_ENCODINGS
        .iter()
        .position(|&e| e == pattern)
        .map(|i| char::from(ALPHABET[i]))
}

/// Code 39 reader
#[derive(Debug, Default)]
pub struct Code39Reader;

impl Code39Reader {
    pub fn new() -> Self {
        Self
    }

    fn read_pattern(runs: &RowRuns, index: usize) -> Option<u16> {
        runs.window(index, CHARACTER_RUNS).and_then(to_narrow_wide)
    }

    fn decode_from(runs: &RowRuns, start: usize) -> Option<RowMatch> {
        let mut text = String::new();
        let mut index = start + CHARACTER_RUNS + 1;

        let end = loop {
            let pattern = Self::read_pattern(runs, index)?;
            if pattern == ASTERISK_ENCODING {
                break index;
            }
            text.push(pattern_to_char(pattern)?);
            index += CHARACTER_RUNS + 1;
        };

        // Quiet zone after the stop character
        let end_width = runs.span(end, CHARACTER_RUNS);
        if runs.run(end + CHARACTER_RUNS) * 2 < end_width {
            return None;
        }
        if text.is_empty() {
            return None;
        }

        Some(RowMatch {
            text,
            format: Symbology::Code39,
            start: runs.start(start) as f32,
            end: runs.end(end + CHARACTER_RUNS - 1) as f32,
        })
    }
}

impl RowDecoder for Code39Reader {
    fn decode_row(
        &self,
        runs: &RowRuns,
        _hints: &DecodeHints,
    ) -> Result<Option<RowMatch>, ReaderError> {
        for start in (1..runs.len()).step_by(2) {
            if Self::read_pattern(runs, start) != Some(ASTERISK_ENCODING) {
                continue;
            }
            let width = runs.span(start, CHARACTER_RUNS);
            if start > 1 && runs.run(start - 1) * 2 < width {
                continue;
            }
            if let Some(found) = Self::decode_from(runs, start) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

impl FormatReader for Code39Reader {
    fn name(&self) -> &'static str {
        "code39"
    }

    fn group(&self) -> SymbologyGroup {
        SymbologyGroup::Linear
    }

    fn symbologies(&self) -> &'static [Symbology] {
        &SYMBOLOGIES
    }

    fn decode(
        &self,
        image: &GrayImage,
        hints: &DecodeHints,
    ) -> Result<Option<ReaderMatch>, ReaderError> {
        if !hints.accepts_any(&SYMBOLOGIES) {
            return Ok(None);
        }
        oned::scan_rows(self, image, hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_every_encoding_has_three_wide() {
        for encoding in CHARACTER_ENCODINGS.iter().chain([ASTERISK_ENCODING].iter()) {
            assert_eq!(encoding.count_ones(), 3, "{:#05x}", encoding);
        }
    }

    #[test]
    fn test_narrow_wide_classification() {
        // '*' has wide elements at positions 1, 4 and 6
        let counters = [2, 6, 2, 2, 6, 2, 6, 2, 2];
        assert_eq!(to_narrow_wide(&counters), Some(0x094));

        // Four wide elements never classify
        assert_eq!(to_narrow_wide(&[6, 6, 2, 2, 6, 2, 6, 2, 2]), None);
        // All equal
        assert_eq!(to_narrow_wide(&[3; 9]), None);
    }

    #[test]
    fn test_decode_row() {
        let runs = testing::row_runs(&testing::code39_modules("CODE-39"), 2, 12);
        let found = Code39Reader::new()
            .decode_row(&runs, &DecodeHints::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.text, "CODE-39");
        assert_eq!(found.format, Symbology::Code39);
    }

    #[test]
    fn test_unterminated_symbol_not_found() {
        let mut modules = testing::code39_modules("AB");
        // Drop the stop character and its gap
        modules.truncate(modules.len() - 16);
        let runs = testing::row_runs(&modules, 2, 12);
        assert!(Code39Reader::new()
            .decode_row(&runs, &DecodeHints::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scan_image() {
        let image = testing::gray_linear(&testing::code39_modules("SHELF 7"), 2, 480, 50);
        let found = Code39Reader::new()
            .decode(&image, &DecodeHints::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.text, "SHELF 7");
    }
}
