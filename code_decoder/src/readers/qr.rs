/*!
QR code reader backed by `rqrr`.

The grayscale plane is handed to rqrr's own adaptive binarizer first. When
trying harder and nothing decodes, a second pass uses a single global Otsu
threshold, which copes better with evenly lit but low-contrast prints.
*/

use super::{FormatReader, ReaderError, ReaderMatch};
use crate::hints::DecodeHints;
use crate::scanline::row_threshold;
use image::GrayImage;
use rqrr::PreparedImage;
use shared::{Point, Symbology, SymbologyGroup};
use tracing::trace;

const SYMBOLOGIES: [Symbology; 1] = [Symbology::QrCode];

/// QR code reader
#[derive(Debug, Default)]
pub struct QrReader;

impl QrReader {
    pub fn new() -> Self {
        Self
    }

    /// First grid that decodes; each attempt pairs a decode result with its bounds
    fn first_decoded<I, M, E>(attempts: I) -> Result<Option<ReaderMatch>, ReaderError>
    where
        I: IntoIterator<Item = (Result<(M, String), E>, Vec<Point>)>,
        E: std::fmt::Display,
    {
        let mut last_error = None;

        for (decoded, points) in attempts {
            match decoded {
                Ok((_meta, content)) => {
                    return Ok(Some(ReaderMatch::new(content, Symbology::QrCode, points)));
                }
                Err(err) => {
                    trace!("QR grid rejected: {}", err);
                    last_error = Some(ReaderError::format(err.to_string()));
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

fn bounds_to_points(bounds: &[rqrr::Point; 4]) -> Vec<Point> {
    bounds
        .iter()
        .map(|p| Point::new(p.x as f32, p.y as f32))
        .collect()
}

impl FormatReader for QrReader {
    fn name(&self) -> &'static str {
        "qr"
    }

    fn group(&self) -> SymbologyGroup {
        SymbologyGroup::Matrix
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

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let (w, h) = (width as usize, height as usize);
        let gray = image.as_raw();

        let mut prepared = PreparedImage::prepare_from_greyscale(w, h, |x, y| gray[y * w + x]);
        let grids = prepared.detect_grids();
        let first =
            Self::first_decoded(grids.iter().map(|g| (g.decode(), bounds_to_points(&g.bounds))));
        if matches!(first, Ok(Some(_))) || !hints.try_harder {
            return first;
        }

        let Some(threshold) = row_threshold(gray) else {
            return first;
        };
        let mut prepared =
            PreparedImage::prepare_from_bitmap(w, h, |x, y| gray[y * w + x] < threshold);
        let grids = prepared.detect_grids();
        match Self::first_decoded(grids.iter().map(|g| (g.decode(), bounds_to_points(&g.bounds)))) {
            Ok(None) => first,
            other => other,
        }
    }
}
