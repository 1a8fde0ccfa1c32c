//! Decoded frame container.
//!
//! - `Frame`: immutable RGB24 pixel grid produced by a frame source.
//! - `FramePair`: the previous/current window the pipeline differences each iteration.
//!
//! Frames are read-only once constructed. The pipeline never holds more than two of them:
//! the pair is advanced by moving the current frame into the previous slot, which drops
//! the older frame.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Bytes per pixel (R, G, B).
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One sampled instant of the video stream.
///
/// Pixel data is private; construction validates the buffer length against the
/// dimensions so every `Frame` in the crate is well-formed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the length does not match `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Internal: wrap a buffer whose length is already known to match.
    pub(crate) fn from_parts(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * CHANNELS);
        Self {
            data,
            width,
            height,
        }
    }

    /// Build a frame by evaluating `pixel` at every coordinate, row-major.
    pub fn from_fn(width: u32, height: u32, mut pixel: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&pixel(x, y));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Uniformly coloured frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_fn(width, height, |_, _| rgb)
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// RGB value at `(x, y)`. Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Read-only view of the interleaved RGB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Frame {
    // Pixel payloads are large; keep Debug output to the shape.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FramePair
// ----------------------------------------------------------------------------

/// Sliding two-frame window.
#[derive(Debug)]
pub struct FramePair {
    previous: Frame,
    current: Frame,
}

impl FramePair {
    pub fn new(previous: Frame, current: Frame) -> Self {
        Self { previous, current }
    }

    pub fn previous(&self) -> &Frame {
        &self.previous
    }

    pub fn current(&self) -> &Frame {
        &self.current
    }

    /// `previous <- current`, `current <- next`. The old previous frame is dropped.
    pub fn advance(&mut self, next: Frame) {
        self.previous = std::mem::replace(&mut self.current, next);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_length_mismatch() {
        assert!(Frame::new(vec![0u8; 11], 2, 2).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn from_fn_is_row_major() {
        let frame = Frame::from_fn(3, 2, |x, y| [x as u8, y as u8, 7]);
        assert_eq!(frame.pixel(2, 1), [2, 1, 7]);
        assert_eq!(frame.pixel(0, 1), [0, 1, 7]);
        assert_eq!(frame.byte_len(), 18);
    }

    #[test]
    fn from_rgb_image_keeps_layout() {
        let mut image = RgbImage::new(4, 3);
        image.put_pixel(1, 2, image::Rgb([9, 8, 7]));
        let frame = Frame::from_rgb_image(image);
        assert_eq!(frame.dimensions(), (4, 3));
        assert_eq!(frame.pixel(1, 2), [9, 8, 7]);
    }

    #[test]
    fn pair_advance_drops_oldest() {
        let a = Frame::filled(2, 2, [1, 1, 1]);
        let b = Frame::filled(2, 2, [2, 2, 2]);
        let c = Frame::filled(2, 2, [3, 3, 3]);

        let mut pair = FramePair::new(a, b);
        pair.advance(c);

        assert_eq!(pair.previous().pixel(0, 0), [2, 2, 2]);
        assert_eq!(pair.current().pixel(0, 0), [3, 3, 3]);
    }
}
