/*!
Pixel-space geometry: corner points and regions of interest.

All coordinates are in source-frame pixels with the origin at the top-left
corner, x growing to the right and y growing downwards.
*/

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};

/// 2D point with floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Translate point by (dx, dy)
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Default share of each dimension covered by [`Roi::centered`]
pub const DEFAULT_CENTER_FRACTION: f32 = 0.7;

/// Rectangular region of interest in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Create a new region
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The region covering a whole `width` x `height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge (x + width), widened so it cannot overflow
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge (y + height), widened so it cannot overflow
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Number of pixels covered
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check that the region is non-empty and lies inside a `width` x `height` image.
    ///
    /// No clamping is applied: a region hanging over the edge is rejected so
    /// that a partially visible code is never silently cropped.
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::invalid_roi(format!(
                "empty region {}x{}",
                self.width, self.height
            )));
        }
        if self.right() > width as u64 || self.bottom() > height as u64 {
            return Err(ScanError::invalid_roi(format!(
                "region {}x{}+{}+{} exceeds image bounds {}x{}",
                self.width, self.height, self.x, self.y, width, height
            )));
        }
        Ok(())
    }

    /// Whether the region fits inside a `width` x `height` image
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.validate_within(width, height).is_ok()
    }

    /// Centered region covering `fraction` of each dimension.
    ///
    /// The fraction is clamped into the open interval (0, 1); non-finite
    /// values fall back to [`DEFAULT_CENTER_FRACTION`]. The result always
    /// covers at least one pixel of a non-empty image.
    pub fn centered(width: u32, height: u32, fraction: f32) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(f32::EPSILON, 1.0 - f32::EPSILON)
        } else {
            DEFAULT_CENTER_FRACTION
        };

        let roi_width = ((width as f32 * fraction).round() as u32).clamp(1, width.max(1));
        let roi_height = ((height as f32 * fraction).round() as u32).clamp(1, height.max(1));

        Self {
            x: width.saturating_sub(roi_width) / 2,
            y: height.saturating_sub(roi_height) / 2,
            width: roi_width,
            height: roi_height,
        }
    }
}
