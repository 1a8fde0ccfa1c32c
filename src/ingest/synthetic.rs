use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;

pub(crate) const SYNTHETIC_WIDTH: u32 = 640;
pub(crate) const SYNTHETIC_HEIGHT: u32 = 720;
pub(crate) const SYNTHETIC_FRAMES: u64 = 32;

const ROAD: [u8; 3] = [30, 30, 30];
const VEHICLE_X: u32 = 280;
const VEHICLE_WIDTH: u32 = 80;
const VEHICLE_HEIGHT: u32 = 60;
/// Rows per frame. Equals the 19 rows inside the default open band (541..=559), so a pass
/// lands in the band exactly once.
const VEHICLE_SPEED: u32 = 19;

/// Synthetic road scene: one vehicle driving straight down through the frame.
///
/// The vehicle carries a vertical shading gradient so consecutive positions still differ
/// where they overlap, the way real bodywork texture does.
pub(crate) struct SyntheticScene {
    label: String,
    frames: u64,
    frame_count: u64,
}

impl SyntheticScene {
    pub(crate) fn new(label: &str, frames: u64) -> Self {
        Self {
            label: label.to_string(),
            frames,
            frame_count: 0,
        }
    }

    fn render(&self, index: u64) -> Frame {
        let top = (index as u32).saturating_mul(VEHICLE_SPEED);
        Frame::from_fn(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, |x, y| {
            let inside = x >= VEHICLE_X
                && x < VEHICLE_X + VEHICLE_WIDTH
                && y >= top
                && y < top.saturating_add(VEHICLE_HEIGHT);
            if inside {
                let shade = (60 + 3 * (y - top)).min(255) as u8;
                [shade, shade, shade]
            } else {
                ROAD
            }
        })
    }
}

impl FrameSource for SyntheticScene {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.frames {
            return Ok(None);
        }
        let frame = self.render(self.frame_count);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("{} (synthetic)", self.label)
    }
}
