//! Frame differencing and motion-mask extraction.
//!
//! The mask pipeline is fixed: luma conversion, 5×5 Gaussian blur, binary threshold,
//! 3×3 square dilation, then a closing with a 2×2 elliptical element. The constants
//! below are part of the detector's observable behaviour and are not per-call knobs.

use image::{GrayImage, Luma};

use crate::error::PipelineError;
use crate::frame::{Frame, CHANNELS};

pub const BLUR_KERNEL_SIZE: u32 = 5;
pub const THRESHOLD_CUTOFF: u8 = 20;
pub const THRESHOLD_MAX: u8 = 255;
pub const DILATE_KERNEL_SIZE: u32 = 3;
pub const CLOSE_KERNEL_SIZE: u32 = 2;

// BT.601 luma weights in 14-bit fixed point.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

// Binomial taps used for a 5-tap Gaussian when sigma is derived from the kernel size.
const GAUSS_5: [u32; 5] = [1, 4, 6, 4, 1];

/// Binary foreground mask. Every pixel is either 0 or `THRESHOLD_MAX`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionMask {
    image: GrayImage,
}

impl MotionMask {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] != 0
    }

    pub fn foreground_count(&self) -> usize {
        self.image.as_raw().iter().filter(|&&p| p != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.image.as_raw().iter().all(|&p| p == 0)
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    /// Wrap an already-binary image. Non-zero pixels are normalised to `THRESHOLD_MAX`.
    pub fn from_gray(mut image: GrayImage) -> Self {
        for p in image.pixels_mut() {
            if p.0[0] != 0 {
                p.0[0] = THRESHOLD_MAX;
            }
        }
        Self { image }
    }
}

/// Per-channel absolute difference of two frames of identical size.
pub fn frame_difference(previous: &Frame, current: &Frame) -> Result<Frame, PipelineError> {
    if !previous.same_dimensions(current) {
        return Err(PipelineError::DimensionMismatch {
            iteration: 0,
            previous: previous.dimensions(),
            current: current.dimensions(),
        });
    }
    let data: Vec<u8> = previous
        .as_bytes()
        .iter()
        .zip(current.as_bytes())
        .map(|(&a, &b)| a.abs_diff(b))
        .collect();
    Ok(Frame::from_parts(data, previous.width, previous.height))
}

/// Run the fixed denoising pipeline over a difference image.
pub fn build_motion_mask(difference: &Frame) -> MotionMask {
    let gray = to_luma(difference);
    let blurred = gaussian_blur_5x5(&gray);
    let binary = threshold(&blurred, THRESHOLD_CUTOFF, THRESHOLD_MAX);
    let dilated = morph(
        &binary,
        &rect_element(DILATE_KERNEL_SIZE, DILATE_KERNEL_SIZE),
        MorphOp::Dilate,
    );
    let close_element = ellipse_element(CLOSE_KERNEL_SIZE, CLOSE_KERNEL_SIZE);
    let closed = morph(
        &morph(&dilated, &close_element, MorphOp::Dilate),
        &close_element,
        MorphOp::Erode,
    );
    MotionMask { image: closed }
}

/// Difference two frames and build the mask in one step.
pub fn motion_mask(previous: &Frame, current: &Frame) -> Result<MotionMask, PipelineError> {
    let difference = frame_difference(previous, current)?;
    Ok(build_motion_mask(&difference))
}

fn to_luma(frame: &Frame) -> GrayImage {
    let bytes = frame.as_bytes();
    let mut out = GrayImage::new(frame.width, frame.height);
    for (i, p) in out.pixels_mut().enumerate() {
        let o = i * CHANNELS;
        let (r, g, b) = (bytes[o] as u32, bytes[o + 1] as u32, bytes[o + 2] as u32);
        let y = (r * LUMA_R + g * LUMA_G + b * LUMA_B + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT;
        *p = Luma([y.min(255) as u8]);
    }
    out
}

fn reflect_101(index: i64, len: i64) -> usize {
    if len <= 1 {
        return 0;
    }
    let mut i = index;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i as usize;
        }
    }
}

fn gaussian_blur_5x5(src: &GrayImage) -> GrayImage {
    let (w, h) = src.dimensions();
    let (wi, hi) = (w as i64, h as i64);
    let radius = (BLUR_KERNEL_SIZE / 2) as i64;
    let raw = src.as_raw();

    // Horizontal pass keeps full precision (max 255 * 16).
    let mut horizontal = vec![0u32; raw.len()];
    for y in 0..h as usize {
        let row = &raw[y * w as usize..(y + 1) * w as usize];
        for x in 0..wi {
            let mut acc = 0u32;
            for (k, tap) in GAUSS_5.iter().enumerate() {
                let sx = reflect_101(x + k as i64 - radius, wi);
                acc += tap * row[sx] as u32;
            }
            horizontal[y * w as usize + x as usize] = acc;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..hi {
        for x in 0..w as usize {
            let mut acc = 0u32;
            for (k, tap) in GAUSS_5.iter().enumerate() {
                let sy = reflect_101(y + k as i64 - radius, hi);
                acc += tap * horizontal[sy * w as usize + x];
            }
            // Total weight is 16 * 16.
            let value = (acc + 128) >> 8;
            out.put_pixel(x as u32, y as u32, Luma([value.min(255) as u8]));
        }
    }
    out
}

fn threshold(src: &GrayImage, cutoff: u8, max_value: u8) -> GrayImage {
    let mut out = src.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > cutoff { max_value } else { 0 };
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MorphOp {
    Dilate,
    Erode,
}

/// Structuring element as anchor-relative `(dx, dy)` offsets of its set cells.
type Element = Vec<(i32, i32)>;

fn rect_element(width: u32, height: u32) -> Element {
    let (ax, ay) = ((width / 2) as i32, (height / 2) as i32);
    let mut offsets = Vec::with_capacity((width * height) as usize);
    for i in 0..height as i32 {
        for j in 0..width as i32 {
            offsets.push((j - ax, i - ay));
        }
    }
    offsets
}

/// Elliptical element inscribed in a `width × height` box, anchored at its centre.
fn ellipse_element(width: u32, height: u32) -> Element {
    let r = (height / 2) as i32;
    let c = (width / 2) as i32;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
    let mut offsets = Vec::new();
    for i in 0..height as i32 {
        let dy = i - r;
        if dy.abs() > r {
            continue;
        }
        let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
        let j1 = (c - dx).max(0);
        let j2 = (c + dx + 1).min(width as i32);
        for j in j1..j2 {
            offsets.push((j - c, i - r));
        }
    }
    offsets
}

/// Grey-level dilation/erosion. Neighbours outside the image are ignored.
fn morph(src: &GrayImage, element: &[(i32, i32)], op: MorphOp) -> GrayImage {
    let (w, h) = src.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let mut value = match op {
                MorphOp::Dilate => u8::MIN,
                MorphOp::Erode => u8::MAX,
            };
            for &(dx, dy) in element {
                let (sx, sy) = (x + dx, y + dy);
                if sx < 0 || sy < 0 || sx >= w as i32 || sy >= h as i32 {
                    continue;
                }
                let p = src.get_pixel(sx as u32, sy as u32).0[0];
                value = match op {
                    MorphOp::Dilate => value.max(p),
                    MorphOp::Erode => value.min(p),
                };
            }
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}
