/*!
Region-of-interest selection.
*/

use image::{ImageBuffer, Rgba, RgbaImage};
use shared::{Result, Roi};
use std::ops::Deref;

/// Copy `roi` out of `image` into a new image of exactly roi.width x roi.height.
///
/// Fails with `InvalidRoi` when the region does not fit; it is never clamped.
pub fn extract<C>(image: &ImageBuffer<Rgba<u8>, C>, roi: Roi) -> Result<RgbaImage>
where
    C: Deref<Target = [u8]>,
{
    let (width, height) = image.dimensions();
    roi.validate_within(width, height)?;

    Ok(RgbaImage::from_fn(roi.width, roi.height, |x, y| {
        *image.get_pixel(roi.x + x, roi.y + y)
    }))
}

/// Centered region covering `fraction` of each dimension (see [`Roi::centered`])
pub fn center_roi(width: u32, height: u32, fraction: f32) -> Roi {
    Roi::centered(width, height, fraction)
}
