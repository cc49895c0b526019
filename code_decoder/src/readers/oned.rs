/*!
Shared machinery for linear (1D) readers: row scheduling and run-width
pattern matching.
*/

use super::{ReaderError, ReaderMatch};
use crate::hints::DecodeHints;
use crate::scanline::RowRuns;
use image::GrayImage;
use shared::{Point, Symbology};
use tracing::trace;

/// Row budget when not trying harder
pub const MAX_ROWS_NORMAL: u32 = 15;

/// Default average variance a pattern may show and still match
pub const MAX_AVG_VARIANCE: f32 = 0.48;

/// Default variance any single run may show and still match
pub const MAX_INDIVIDUAL_VARIANCE: f32 = 0.7;

/// A symbol found on one row, positions in reading direction
#[derive(Debug, Clone, PartialEq)]
pub struct RowMatch {
    pub text: String,
    pub format: Symbology,
    pub start: f32,
    pub end: f32,
}

/// Decodes a symbol from one binarized row
pub trait RowDecoder {
    fn decode_row(
        &self,
        runs: &RowRuns,
        hints: &DecodeHints,
    ) -> Result<Option<RowMatch>, ReaderError>;
}

/// How closely observed run widths follow a module-width pattern.
///
/// Returns the average variance relative to the total width, or
/// `f32::INFINITY` when some run strays more than `max_individual_variance`
/// modules from its expected width.
pub fn pattern_match_variance(counters: &[u32], pattern: &[u8], max_individual_variance: f32) -> f32 {
    let total: u32 = counters.iter().sum();
    let pattern_length: u32 = pattern.iter().map(|&p| p as u32).sum();
    if total < pattern_length || pattern_length == 0 || counters.len() != pattern.len() {
        // Narrower than one pixel per module
        return f32::INFINITY;
    }

    let unit_bar_width = total as f32 / pattern_length as f32;
    let max_individual = max_individual_variance * unit_bar_width;

    let mut total_variance = 0.0f32;
    for (&counter, &module) in counters.iter().zip(pattern) {
        let scaled = module as f32 * unit_bar_width;
        let variance = (counter as f32 - scaled).abs();
        if variance > max_individual {
            return f32::INFINITY;
        }
        total_variance += variance;
    }

    total_variance / total as f32
}

/// Index of the best matching pattern under `max_avg_variance`
pub fn best_match(
    counters: &[u32],
    patterns: &[&[u8]],
    max_avg_variance: f32,
    max_individual_variance: f32,
) -> Option<usize> {
    let mut best_variance = max_avg_variance;
    let mut best = None;
    for (index, pattern) in patterns.iter().enumerate() {
        let variance = pattern_match_variance(counters, pattern, max_individual_variance);
        if variance < best_variance {
            best_variance = variance;
            best = Some(index);
        }
    }
    best
}

/// Row `index` of the scan schedule, or `None` once it leaves the image
fn scheduled_row(index: u32, middle: u32, step: u32, height: u32) -> Option<u32> {
    let steps = (index + 1) / 2;
    let offset = step as i64 * steps as i64;
    let row = if index % 2 == 0 {
        middle as i64 + offset
    } else {
        middle as i64 - offset
    };
    (0..height as i64).contains(&row).then_some(row as u32)
}

/// Run `decoder` over rows of `image` from the middle outwards.
///
/// The first row that decodes wins. When no row decodes, the last symbol
/// level error seen (if any) is returned.
pub fn scan_rows<D>(
    decoder: &D,
    image: &GrayImage,
    hints: &DecodeHints,
) -> Result<Option<ReaderMatch>, ReaderError>
where
    D: RowDecoder + ?Sized,
{
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(None);
    }

    let middle = height / 2;
    let step = (height >> if hints.try_harder { 5 } else { 4 }).max(1);
    let max_rows = if hints.try_harder {
        height
    } else {
        MAX_ROWS_NORMAL
    };

    let mut last_error = None;
    for index in 0..max_rows {
        let Some(y) = scheduled_row(index, middle, step, height) else {
            break;
        };
        let Some(forward) = RowRuns::sample(image, y) else {
            continue;
        };

        let reversed = hints.try_harder.then(|| forward.reversed());
        for runs in std::iter::once(&forward).chain(reversed.as_ref()) {
            match decoder.decode_row(runs, hints) {
                Ok(Some(found)) => {
                    let row_y = y as f32 + 0.5;
                    let points = vec![
                        Point::new(runs.to_image_x(found.start), row_y),
                        Point::new(runs.to_image_x(found.end), row_y),
                    ];
                    return Ok(Some(ReaderMatch::new(found.text, found.format, points)));
                }
                Ok(None) => {}
                Err(err) => {
                    trace!("row {} rejected: {}", y, err);
                    last_error = Some(err);
                }
            }
        }
    }

    match last_error {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_variance() {
        // Exact match at 3 px per module
        assert_eq!(pattern_match_variance(&[3, 6, 3], &[1, 2, 1], 0.7), 0.0);

        // One run off by a whole module
        assert_eq!(
            pattern_match_variance(&[6, 3, 3], &[1, 2, 1], 0.7),
            f32::INFINITY
        );

        // Too narrow to hold the pattern
        assert_eq!(pattern_match_variance(&[1, 1], &[2, 2], 0.7), f32::INFINITY);

        let slight = pattern_match_variance(&[4, 6, 3], &[1, 2, 1], 0.7);
        assert!(slight > 0.0 && slight < MAX_AVG_VARIANCE);
    }

    #[test]
    fn test_best_match_picks_lowest() {
        let patterns: [&[u8]; 3] = [&[3, 1], &[1, 1], &[1, 3]];
        assert_eq!(best_match(&[5, 5], &patterns, 0.48, 0.7), Some(1));
        assert_eq!(best_match(&[2, 6], &patterns, 0.48, 0.7), Some(2));
        assert_eq!(best_match(&[9, 1, 1], &patterns, 0.48, 0.7), None);
    }

    #[test]
    fn test_row_schedule_alternates_from_middle() {
        let rows: Vec<_> = (0..5).map_while(|i| scheduled_row(i, 50, 10, 100)).collect();
        assert_eq!(rows, vec![50, 40, 60, 30, 70]);

        // Stops at the image edge
        let rows: Vec<_> = (0..10).map_while(|i| scheduled_row(i, 2, 2, 5)).collect();
        assert_eq!(rows, vec![2, 0, 4]);
    }
}
