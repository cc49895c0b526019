/*!
Code 128 reader.

Supports start codes A, B and C, code set switching, SHIFT, and FNC1
(dropped from the text). The modulo-103 checksum is verified and removed.
*/

use super::oned::{self, best_match, pattern_match_variance, RowDecoder, RowMatch};
use super::{FormatReader, ReaderError, ReaderMatch};
use crate::hints::DecodeHints;
use crate::scanline::RowRuns;
use image::GrayImage;
use shared::{Symbology, SymbologyGroup};

/// Element widths of every code; 106 is STOP without its trailing bar
pub(crate) const CODE_PATTERNS: [[u8; 6]; 107] = [
    [2, 1, 2, 2, 2, 2], [2, 2, 2, 1, 2, 2], [2, 2, 2, 2, 2, 1], [1, 2, 1, 2, 2, 3],
    [1, 2, 1, 3, 2, 2], [1, 3, 1, 2, 2, 2], [1, 2, 2, 2, 1, 3], [1, 2, 2, 3, 1, 2],
    [1, 3, 2, 2, 1, 2], [2, 2, 1, 2, 1, 3], [2, 2, 1, 3, 1, 2], [2, 3, 1, 2, 1, 2],
    [1, 1, 2, 2, 3, 2], [1, 2, 2, 1, 3, 2], [1, 2, 2, 2, 3, 1], [1, 1, 3, 2, 2, 2],
    [1, 2, 3, 1, 2, 2], [1, 2, 3, 2, 2, 1], [2, 2, 3, 2, 1, 1], [2, 2, 1, 1, 3, 2],
    [2, 2, 1, 2, 3, 1], [2, 1, 3, 2, 1, 2], [2, 2, 3, 1, 1, 2], [3, 1, 2, 1, 3, 1],
    [3, 1, 1, 2, 2, 2], [3, 2, 1, 1, 2, 2], [3, 2, 1, 2, 2, 1], [3, 1, 2, 2, 1, 2],
    [3, 2, 2, 1, 1, 2], [3, 2, 2, 2, 1, 1], [2, 1, 2, 1, 2, 3], [2, 1, 2, 3, 2, 1],
    [2, 3, 2, 1, 2, 1], [1, 1, 1, 3, 2, 3], [1, 3, 1, 1, 2, 3], [1, 3, 1, 3, 2, 1],
    [1, 1, 2, 3, 1, 3], [1, 3, 2, 1, 1, 3], [1, 3, 2, 3, 1, 1], [2, 1, 1, 3, 1, 3],
    [2, 3, 1, 1, 1, 3], [2, 3, 1, 3, 1, 1], [1, 1, 2, 1, 3, 3], [1, 1, 2, 3, 3, 1],
    [1, 3, 2, 1, 3, 1], [1, 1, 3, 1, 2, 3], [1, 1, 3, 3, 2, 1], [1, 3, 3, 1, 2, 1],
    [3, 1, 3, 1, 2, 1], [2, 1, 1, 3, 3, 1], [2, 3, 1, 1, 3, 1], [2, 1, 3, 1, 1, 3],
    [2, 1, 3, 3, 1, 1], [2, 1, 3, 1, 3, 1], [3, 1, 1, 1, 2, 3], [3, 1, 1, 3, 2, 1],
    [3, 3, 1, 1, 2, 1], [3, 1, 2, 1, 1, 3], [3, 1, 2, 3, 1, 1], [3, 3, 2, 1, 1, 1],
    [3, 1, 4, 1, 1, 1], [2, 2, 1, 4, 1, 1], [4, 3, 1, 1, 1, 1], [1, 1, 1, 2, 2, 4],
    [1, 1, 1, 4, 2, 2], [1, 2, 1, 1, 2, 4], [1, 2, 1, 4, 2, 1], [1, 4, 1, 1, 2, 2],
    [1, 4, 1, 2, 2, 1], [1, 1, 2, 2, 1, 4], [1, 1, 2, 4, 1, 2], [1, 2, 2, 1, 1, 4],
    [1, 2, 2, 4, 1, 1], [1, 4, 2, 1, 1, 2], [1, 4, 2, 2, 1, 1], [2, 4, 1, 2, 1, 1],
    [2, 2, 1, 1, 1, 4], [4, 1, 3, 1, 1, 1], [2, 4, 1, 1, 1, 2], [1, 3, 4, 1, 1, 1],
    [1, 1, 1, 2, 4, 2], [1, 2, 1, 1, 4, 2], [1, 2, 1, 2, 4, 1], [1, 1, 4, 2, 1, 2],
    [1, 2, 4, 1, 1, 2], [1, 2, 4, 2, 1, 1], [4, 1, 1, 2, 1, 2], [4, 2, 1, 1, 1, 2],
    [4, 2, 1, 2, 1, 1], [2, 1, 2, 1, 4, 1], [2, 1, 4, 1, 2, 1], [4, 1, 2, 1, 2, 1],
    [1, 1, 1, 1, 4, 3], [1, 1, 1, 3, 4, 1], [1, 3, 1, 1, 4, 1], [1, 1, 4, 1, 1, 3],
    [1, 1, 4, 3, 1, 1], [4, 1, 1, 1, 1, 3], [4, 1, 1, 3, 1, 1], [1, 1, 3, 1, 4, 1],
    [1, 1, 4, 1, 3, 1], [3, 1, 1, 1, 4, 1], [4, 1, 1, 1, 3, 1], [2, 1, 1, 4, 1, 2],
    [2, 1, 1, 2, 1, 4], [2, 1, 1, 2, 3, 2], [2, 3, 3, 1, 1, 1],
];

/// Width of the bar that closes the STOP pattern
pub(crate) const STOP_TRAILING_BAR: u8 = 2;

pub(crate) const CODE_SHIFT: u8 = 98;
pub(crate) const CODE_CODE_C: u8 = 99;
pub(crate) const CODE_CODE_B: u8 = 100;
pub(crate) const CODE_CODE_A: u8 = 101;
pub(crate) const CODE_FNC_1: u8 = 102;
pub(crate) const CODE_START_A: u8 = 103;
pub(crate) const CODE_START_B: u8 = 104;
pub(crate) const CODE_START_C: u8 = 105;
pub(crate) const CODE_STOP: u8 = 106;

/// Tighter than the UPC/EAN default; Code 128 patterns are dense
const MAX_AVG_VARIANCE: f32 = 0.25;

const SYMBOLOGIES: [Symbology; 1] = [Symbology::Code128];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    A,
    B,
    C,
}

fn all_patterns() -> [&'static [u8]; 107] {
    let mut out: [&'static [u8]; 107] = [&[]; 107];
    for (slot, pattern) in out.iter_mut().zip(CODE_PATTERNS.iter()) {
        *slot = pattern;
    }
    out
}

/// Interpret data codes (start code first, no checksum, no stop)
fn interpret(codes: &[u8]) -> Result<String, ReaderError> {
    let (&start, data) = codes
        .split_first()
        .ok_or_else(|| ReaderError::format("empty Code 128 symbol"))?;
    let mut set = match start {
        CODE_START_A => CodeSet::A,
        CODE_START_B => CodeSet::B,
        CODE_START_C => CodeSet::C,
        other => return Err(ReaderError::format(format!("invalid start code {}", other))),
    };

    let mut text = String::new();
    let mut shifted = false;
    for &code in data {
        let active = match (shifted, set) {
            (true, CodeSet::A) => CodeSet::B,
            (true, CodeSet::B) => CodeSet::A,
            (_, current) => current,
        };
        shifted = false;

        if code >= CODE_START_A {
            return Err(ReaderError::format(format!("unexpected code {}", code)));
        }

        match active {
            CodeSet::A => match code {
                0..=63 => text.push(char::from(b' ' + code)),
                64..=95 => text.push(char::from(code - 64)),
                CODE_SHIFT => shifted = true,
                CODE_CODE_C => set = CodeSet::C,
                CODE_CODE_B => set = CodeSet::B,
                // FNC1-FNC4 carry no text
                _ => {}
            },
            CodeSet::B => match code {
                0..=95 => text.push(char::from(b' ' + code)),
                CODE_SHIFT => shifted = true,
                CODE_CODE_C => set = CodeSet::C,
                CODE_CODE_A => set = CodeSet::A,
                _ => {}
            },
            CodeSet::C => match code {
                0..=99 => {
                    text.push(char::from(b'0' + code / 10));
                    text.push(char::from(b'0' + code % 10));
                }
                CODE_CODE_B => set = CodeSet::B,
                CODE_CODE_A => set = CodeSet::A,
                CODE_FNC_1 => {}
                _ => {}
            },
        }
    }

    Ok(text)
}

/// Modulo-103 check value over a start code and data codes
pub fn checksum(codes: &[u8]) -> u8 {
    let total: u32 = codes
        .iter()
        .enumerate()
        .map(|(i, &code)| code as u32 * (i as u32).max(1))
        .sum();
    (total % 103) as u8
}

/// Code 128 reader
#[derive(Debug, Default)]
pub struct Code128Reader;

impl Code128Reader {
    pub fn new() -> Self {
        Self
    }

    fn decode_code(runs: &RowRuns, index: usize, patterns: &[&[u8]]) -> Option<u8> {
        let window = runs.window(index, 6)?;
        best_match(window, patterns, MAX_AVG_VARIANCE, oned::MAX_INDIVIDUAL_VARIANCE)
            .map(|code| code as u8)
    }

    fn find_start(runs: &RowRuns, index: usize) -> Option<u8> {
        let window = runs.window(index, 6)?;
        let mut best_variance = MAX_AVG_VARIANCE;
        let mut best = None;
        for start in CODE_START_A..=CODE_START_C {
            let variance = pattern_match_variance(
                window,
                &CODE_PATTERNS[start as usize],
                oned::MAX_INDIVIDUAL_VARIANCE,
            );
            if variance < best_variance {
                best_variance = variance;
                best = Some(start);
            }
        }
        let start = best?;

        // Light run before the start code must be half its width, or reach the row edge
        let width = runs.span(index, 6);
        if index > 1 && runs.run(index - 1) < width / 2 {
            return None;
        }
        Some(start)
    }

    fn decode_from(
        runs: &RowRuns,
        start_index: usize,
        start_code: u8,
        patterns: &[&[u8]],
    ) -> Result<Option<RowMatch>, ReaderError> {
        let mut codes = vec![start_code];
        let mut index = start_index + 6;

        let stop_index = loop {
            let Some(code) = Self::decode_code(runs, index, patterns) else {
                return Ok(None);
            };
            if code == CODE_STOP {
                break index;
            }
            if code >= CODE_START_A {
                return Ok(None);
            }
            codes.push(code);
            index += 6;
        };

        // STOP ends with one more bar, then a quiet zone of half a symbol width
        let trailing = stop_index + 6;
        let stop_width = runs.span(stop_index, 6);
        let module = stop_width as f32 / 11.0;
        if (runs.run(trailing) as f32) < module * STOP_TRAILING_BAR as f32 / 2.0 {
            return Ok(None);
        }
        if runs.run(trailing + 1) < stop_width / 2 {
            return Ok(None);
        }

        // Start code, at least one data code, checksum
        if codes.len() < 3 {
            return Ok(None);
        }
        let Some((&check, body)) = codes.split_last() else {
            return Ok(None);
        };
        if checksum(body) != check {
            return Err(ReaderError::checksum(format!(
                "Code 128 check {} expected {}",
                check,
                checksum(body)
            )));
        }

        let text = interpret(body)?;
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(RowMatch {
            text,
            format: Symbology::Code128,
            start: runs.start(start_index) as f32,
            end: runs.end(trailing) as f32,
        }))
    }
}

impl RowDecoder for Code128Reader {
    fn decode_row(
        &self,
        runs: &RowRuns,
        _hints: &DecodeHints,
    ) -> Result<Option<RowMatch>, ReaderError> {
        let patterns = all_patterns();
        let mut last_error = None;

        for index in (1..runs.len()).step_by(2) {
            let Some(start_code) = Self::find_start(runs, index) else {
                continue;
            };
            match Self::decode_from(runs, index, start_code, &patterns) {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(err) => last_error = Some(err),
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

impl FormatReader for Code128Reader {
    fn name(&self) -> &'static str {
        "code128"
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
