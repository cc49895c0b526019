/*!
Bitmap conversion.

Turns a raw interleaved RGBA buffer into an addressable image without copying
the pixels, and derives the luminance plane the readers work on.
*/

use image::{GrayImage, ImageBuffer, Rgba, RgbaImage};
use shared::frame::{expected_len, BYTES_PER_PIXEL};
use shared::{Frame, Result, ScanError};
use std::ops::Deref;

/// Coefficients for luminance: Y = (77*R + 150*G + 29*B) >> 8 (BT.601, sums to 256)
const COEF_R: u32 = 77;
const COEF_G: u32 = 150;
const COEF_B: u32 = 29;

/// RGBA image borrowing a frame's pixels
pub type RgbaView<'a> = ImageBuffer<Rgba<u8>, &'a [u8]>;

/// Wrap a raw RGBA buffer as an image.
///
/// Fails with `InvalidImage` unless `data.len() == width * height * 4`.
pub fn from_raw(data: &[u8], width: u32, height: u32) -> Result<RgbaView<'_>> {
    if data.is_empty() {
        return Err(ScanError::MissingImageData);
    }
    if width == 0 || height == 0 {
        return Err(ScanError::invalid_image(format!(
            "invalid dimensions {}x{}",
            width, height
        )));
    }

    let expected = expected_len(width, height).ok_or_else(|| {
        ScanError::invalid_image(format!("dimensions {}x{} overflow", width, height))
    })?;
    if data.len() != expected {
        return Err(ScanError::invalid_image(format!(
            "buffer length {} does not match {}x{}x{} = {}",
            data.len(),
            width,
            height,
            BYTES_PER_PIXEL,
            expected
        )));
    }

    ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| ScanError::invalid_image("buffer rejected by image container"))
}

/// Wrap a frame's pixels as an image
pub fn from_frame(frame: &Frame) -> Result<RgbaView<'_>> {
    from_raw(frame.data(), frame.width(), frame.height())
}

/// Luminance of one RGBA pixel; alpha is ignored
#[inline]
pub fn luma(pixel: &[u8]) -> u8 {
    let lum = (COEF_R * pixel[0] as u32 + COEF_G * pixel[1] as u32 + COEF_B * pixel[2] as u32) >> 8;
    lum.min(255) as u8
}

/// Grayscale derivative of an RGBA image.
///
/// Produced fresh for every decode attempt; callers must not cache it.
pub fn luminance<C>(image: &ImageBuffer<Rgba<u8>, C>) -> GrayImage
where
    C: Deref<Target = [u8]>,
{
    let (width, height) = image.dimensions();
    let raw: &[u8] = image.as_raw();
    let gray: Vec<u8> = raw
        .chunks_exact(BYTES_PER_PIXEL)
        .take(width as usize * height as usize)
        .map(luma)
        .collect();

    // Length is width * height by construction
    GrayImage::from_raw(width, height, gray).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Owned copy of a borrowed view
pub fn to_owned(image: &RgbaView<'_>) -> RgbaImage {
    let (width, height) = image.dimensions();
    RgbaImage::from_raw(width, height, image.as_raw().to_vec())
        .unwrap_or_else(|| RgbaImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_checks_length() {
        let data = vec![0u8; 3 * 2 * 4];
        let view = from_raw(&data, 3, 2).unwrap();
        assert_eq!(view.dimensions(), (3, 2));

        assert!(matches!(from_raw(&data, 2, 2), Err(ScanError::InvalidImage(_))));
        assert!(matches!(from_raw(&data[..23], 3, 2), Err(ScanError::InvalidImage(_))));
        assert!(matches!(from_raw(&[], 3, 2), Err(ScanError::MissingImageData)));
        assert!(matches!(from_raw(&data, 0, 6), Err(ScanError::InvalidImage(_))));
    }

    #[test]
    fn test_luminance_conversion() {
        #[rustfmt::skip]
        let data = vec![
            255, 255, 255, 255,   0, 0, 0, 255,
            255, 0, 0, 255,       0, 255, 0, 0,
        ];
        let view = from_raw(&data, 2, 2).unwrap();
        let gray = luminance(&view);

        assert_eq!(gray.dimensions(), (2, 2));
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
        assert_eq!(gray.get_pixel(0, 1)[0], 76);
        // Alpha does not affect luminance
        assert_eq!(gray.get_pixel(1, 1)[0], 149);
    }

    #[test]
    fn test_view_borrows_frame_pixels() {
        let frame = Frame::new(vec![9u8; 4 * 4 * 4], 4, 4);
        let view = from_frame(&frame).unwrap();
        assert_eq!(view.as_raw().as_ptr(), frame.data().as_ptr());
        assert_eq!(to_owned(&view).as_raw(), &frame.data().to_vec());
    }
}
