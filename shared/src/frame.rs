/*!
Raw camera frame data structures.

A [`Frame`] is an immutable RGBA pixel buffer plus the monotonic instant it
was captured at. The buffer is reference counted ([`Bytes`]) so handing a
frame to the decode context never copies or mutates the caller's pixels.
*/

use crate::error::{Result, ScanError};
use bytes::Bytes;
use std::sync::OnceLock;
use std::time::Instant;

/// Bytes per pixel of the interleaved RGBA layout
pub const BYTES_PER_PIXEL: usize = 4;

/// Process-wide origin of the monotonic millisecond clock
fn clock_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Milliseconds between the process clock origin and `instant`.
///
/// Instants taken before the origin was first observed report 0.
pub fn monotonic_ms(instant: Instant) -> u64 {
    instant
        .saturating_duration_since(clock_origin())
        .as_millis() as u64
}

/// Expected RGBA buffer length for the given dimensions, if it fits in memory
pub fn expected_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Immutable camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self::captured_at(data, width, height, Instant::now())
    }

    /// Create a frame with an explicit capture instant
    pub fn captured_at(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        captured_at: Instant,
    ) -> Self {
        // Touch the origin so every later instant maps to a non-zero offset
        clock_origin();
        Self {
            data: data.into(),
            width,
            height,
            captured_at,
        }
    }

    /// Raw interleaved RGBA bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the pixel buffer
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Monotonic capture instant
    pub fn captured(&self) -> Instant {
        self.captured_at
    }

    /// Capture time in monotonic milliseconds
    pub fn timestamp_ms(&self) -> u64 {
        monotonic_ms(self.captured_at)
    }

    /// Same pixels, captured at a different instant
    pub fn recaptured(&self, captured_at: Instant) -> Self {
        Self {
            captured_at,
            ..self.clone()
        }
    }

    /// Check that the buffer describes a `width` x `height` RGBA image
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(ScanError::MissingImageData);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::invalid_image(format!(
                "invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        match expected_len(self.width, self.height) {
            Some(len) if len == self.data.len() => Ok(()),
            Some(len) => Err(ScanError::invalid_image(format!(
                "buffer length {} does not match {}x{}x{} = {}",
                self.data.len(),
                self.width,
                self.height,
                BYTES_PER_PIXEL,
                len
            ))),
            None => Err(ScanError::invalid_image(format!(
                "dimensions {}x{} overflow",
                self.width, self.height
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_validation() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 4], 4, 4);
        assert!(frame.validate().is_ok());

        let short = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4);
        assert!(matches!(short.validate(), Err(ScanError::InvalidImage(_))));

        let empty = Frame::new(Vec::new(), 4, 4);
        assert!(matches!(empty.validate(), Err(ScanError::MissingImageData)));

        let zero = Frame::new(vec![0u8; 16], 0, 4);
        assert!(matches!(zero.validate(), Err(ScanError::InvalidImage(_))));
    }

    #[test]
    fn test_frame_shares_buffer() {
        let frame = Frame::new(vec![7u8; 16], 2, 2);
        let copy = frame.clone();
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
        assert_eq!(frame.bytes().len(), 16);
    }

    #[test]
    fn test_monotonic_timestamps() {
        // Establish the clock origin before taking the base instant
        let _ = Frame::new(vec![0u8; 4], 1, 1);
        let base = Instant::now();
        let frame = Frame::captured_at(vec![0u8; 4], 1, 1, base);
        let later = frame.recaptured(base + Duration::from_millis(250));

        assert_eq!(later.timestamp_ms() - frame.timestamp_ms(), 250);
        assert_eq!(later.width(), 1);
    }
}
