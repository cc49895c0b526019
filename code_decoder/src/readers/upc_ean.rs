/*!
UPC/EAN family reader: EAN-13, UPC-A and EAN-8.

EAN-13 is attempted before EAN-8 at every start guard. UPC-A is EAN-13 with
an implicit leading zero and is reported as such when enabled.
*/

use super::oned::{self, best_match, pattern_match_variance, RowDecoder, RowMatch};
use super::{FormatReader, ReaderError, ReaderMatch};
use crate::hints::DecodeHints;
use crate::scanline::RowRuns;
use image::GrayImage;
use shared::{Symbology, SymbologyGroup};

pub(crate) const START_END_PATTERN: [u8; 3] = [1, 1, 1];
pub(crate) const MIDDLE_PATTERN: [u8; 5] = [1, 1, 1, 1, 1];

/// Odd-parity digit widths, read starting with a space
pub(crate) const L_PATTERNS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// Even-parity digit widths (L reversed)
pub(crate) const G_PATTERNS: [[u8; 4]; 10] = [
    [1, 1, 2, 3],
    [1, 2, 2, 2],
    [2, 2, 1, 2],
    [1, 1, 4, 1],
    [2, 3, 1, 1],
    [1, 3, 2, 1],
    [4, 1, 1, 1],
    [2, 1, 3, 1],
    [3, 1, 2, 1],
    [2, 1, 1, 3],
];

/// G-parity mask of the six left digits, indexed by the implied first digit
pub(crate) const FIRST_DIGIT_ENCODINGS: [u8; 10] =
    [0x00, 0x0B, 0x0D, 0x0E, 0x13, 0x19, 0x1C, 0x15, 0x16, 0x1A];

const SYMBOLOGIES: [Symbology; 3] = [Symbology::Ean13, Symbology::UpcA, Symbology::Ean8];

/// Check digit for a UPC/EAN body (all digits except the check digit)
pub fn check_digit(body: &[u8]) -> u8 {
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d as u32 * 3 } else { d as u32 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

fn checksum_ok(digits: &[u8]) -> bool {
    match digits.split_last() {
        Some((&check, body)) if !body.is_empty() => check_digit(body) == check,
        _ => false,
    }
}

fn digits_to_string(digits: &[u8]) -> String {
    digits.iter().map(|&d| char::from(b'0' + d)).collect()
}

fn l_patterns() -> [&'static [u8]; 10] {
    let mut out: [&'static [u8]; 10] = [&[]; 10];
    for (slot, pattern) in out.iter_mut().zip(L_PATTERNS.iter()) {
        *slot = pattern;
    }
    out
}

fn lg_patterns() -> [&'static [u8]; 20] {
    let mut out: [&'static [u8]; 20] = [&[]; 20];
    for (slot, pattern) in out.iter_mut().zip(L_PATTERNS.iter().chain(G_PATTERNS.iter())) {
        *slot = pattern;
    }
    out
}

fn matches_guard(runs: &RowRuns, index: usize, pattern: &[u8]) -> bool {
    runs.window(index, pattern.len())
        .map(|window| {
            pattern_match_variance(window, pattern, oned::MAX_INDIVIDUAL_VARIANCE)
                < oned::MAX_AVG_VARIANCE
        })
        .unwrap_or(false)
}

/// Reader for EAN-13, UPC-A and EAN-8
#[derive(Debug, Default)]
pub struct UpcEanReader;

impl UpcEanReader {
    pub fn new() -> Self {
        Self
    }

    fn decode_digits(
        runs: &RowRuns,
        index: &mut usize,
        count: usize,
        patterns: &[&[u8]],
    ) -> Option<Vec<usize>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let window = runs.window(*index, 4)?;
            let best = best_match(
                window,
                patterns,
                oned::MAX_AVG_VARIANCE,
                oned::MAX_INDIVIDUAL_VARIANCE,
            )?;
            out.push(best);
            *index += 4;
        }
        Some(out)
    }

    /// Middle guard, right half and end guard; returns the end guard index
    fn decode_right_half(runs: &RowRuns, mut index: usize, count: usize) -> Option<(Vec<u8>, usize)> {
        if !matches_guard(runs, index, &MIDDLE_PATTERN) {
            return None;
        }
        index += MIDDLE_PATTERN.len();

        let right = Self::decode_digits(runs, &mut index, count, &l_patterns())?;

        if !matches_guard(runs, index, &START_END_PATTERN) {
            return None;
        }
        let guard_width = runs.span(index, START_END_PATTERN.len());
        if runs.run(index + START_END_PATTERN.len()) < guard_width {
            return None;
        }

        Some((right.into_iter().map(|d| d as u8).collect(), index))
    }

    fn decode_ean13(
        runs: &RowRuns,
        start_guard: usize,
        hints: &DecodeHints,
    ) -> Result<Option<RowMatch>, ReaderError> {
        let mut index = start_guard + START_END_PATTERN.len();
        let Some(left) = Self::decode_digits(runs, &mut index, 6, &lg_patterns()) else {
            return Ok(None);
        };

        let mut parity = 0u8;
        for (x, &best) in left.iter().enumerate() {
            if best >= 10 {
                parity |= 1 << (5 - x);
            }
        }
        let Some(first) = FIRST_DIGIT_ENCODINGS.iter().position(|&p| p == parity) else {
            return Ok(None);
        };

        let Some((right, end_guard)) = Self::decode_right_half(runs, index, 6) else {
            return Ok(None);
        };

        let mut digits = Vec::with_capacity(13);
        digits.push(first as u8);
        digits.extend(left.iter().map(|&d| (d % 10) as u8));
        digits.extend(right);

        if !checksum_ok(&digits) {
            return Err(ReaderError::checksum(format!(
                "EAN-13 {}",
                digits_to_string(&digits)
            )));
        }

        let text = digits_to_string(&digits);
        let (format, text) = if first == 0 && hints.accepts(Symbology::UpcA) {
            (Symbology::UpcA, text[1..].to_string())
        } else if hints.accepts(Symbology::Ean13) {
            (Symbology::Ean13, text)
        } else {
            return Ok(None);
        };

        Ok(Some(Self::row_match(runs, start_guard, end_guard, text, format)))
    }

    fn decode_ean8(runs: &RowRuns, start_guard: usize) -> Result<Option<RowMatch>, ReaderError> {
        let mut index = start_guard + START_END_PATTERN.len();
        let Some(left) = Self::decode_digits(runs, &mut index, 4, &l_patterns()) else {
            return Ok(None);
        };
        let Some((right, end_guard)) = Self::decode_right_half(runs, index, 4) else {
            return Ok(None);
        };

        let mut digits: Vec<u8> = left.into_iter().map(|d| d as u8).collect();
        digits.extend(right);

        if !checksum_ok(&digits) {
            return Err(ReaderError::checksum(format!(
                "EAN-8 {}",
                digits_to_string(&digits)
            )));
        }

        Ok(Some(Self::row_match(
            runs,
            start_guard,
            end_guard,
            digits_to_string(&digits),
            Symbology::Ean8,
        )))
    }

    fn row_match(
        runs: &RowRuns,
        start_guard: usize,
        end_guard: usize,
        text: String,
        format: Symbology,
    ) -> RowMatch {
        let guard_runs = START_END_PATTERN.len();
        let start = (runs.start(start_guard) + runs.end(start_guard + guard_runs - 1)) as f32 / 2.0;
        let end = (runs.start(end_guard) + runs.end(end_guard + guard_runs - 1)) as f32 / 2.0;
        RowMatch {
            text,
            format,
            start,
            end,
        }
    }
}

impl RowDecoder for UpcEanReader {
    fn decode_row(
        &self,
        runs: &RowRuns,
        hints: &DecodeHints,
    ) -> Result<Option<RowMatch>, ReaderError> {
        let try_ean13 = hints.accepts(Symbology::Ean13) || hints.accepts(Symbology::UpcA);
        let try_ean8 = hints.accepts(Symbology::Ean8);

        let mut last_error = None;
        // Start guards begin on a bar, which always has an odd index
        for start_guard in (1..runs.len()).step_by(2) {
            if !matches_guard(runs, start_guard, &START_END_PATTERN) {
                continue;
            }
            let guard_width = runs.span(start_guard, START_END_PATTERN.len());
            if runs.run(start_guard - 1) < guard_width {
                continue;
            }

            if try_ean13 {
                match Self::decode_ean13(runs, start_guard, hints) {
                    Ok(Some(found)) => return Ok(Some(found)),
                    Ok(None) => {}
                    Err(err) => last_error = Some(err),
                }
            }
            if try_ean8 {
                match Self::decode_ean8(runs, start_guard) {
                    Ok(Some(found)) => return Ok(Some(found)),
                    Ok(None) => {}
                    Err(err) => last_error = Some(err),
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

impl FormatReader for UpcEanReader {
    fn name(&self) -> &'static str {
        "upc_ean"
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
