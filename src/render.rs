//! Drawing instructions for annotated frames.
//!
//! The core never composites pixels. Each iteration it describes what a renderer should
//! draw (boxes, the counting line, centroids, labels) as plain data that serializes to
//! JSON for out-of-process renderers.

use anyhow::Context;
use serde::Serialize;
use std::io::Write;

use crate::detect::CandidateBlob;
use crate::pipeline::{IterationReport, IterationSink};

pub const COUNT_LABEL: &str = "Total Vehicle Detected: ";
pub const ALERT_LABEL: &str = "Vehicle Overload Alert!";
pub const GREEN_TIME_LABEL: &str = "Green Time: ";

pub type Rgb = [u8; 3];

/// Colours, offsets and label anchors used when building an overlay.
#[derive(Clone, Debug)]
pub struct OverlayStyle {
    /// Padding added around each blob's bounding box.
    pub box_padding: i32,
    pub box_color: Rgb,
    pub line_color: Rgb,
    pub line_end_x: i32,
    pub centroid_radius: u32,
    pub centroid_color: Rgb,
    pub count_color: Rgb,
    pub alert_color: Rgb,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_padding: 10,
            box_color: [0, 0, 255],
            line_color: [0, 255, 0],
            line_end_x: 1900,
            centroid_radius: 5,
            centroid_color: [0, 255, 0],
            count_color: [0, 170, 0],
            alert_color: [255, 0, 0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
    Rectangle {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        color: Rgb,
        thickness: u32,
    },
    Line {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        color: Rgb,
        thickness: u32,
    },
    Circle {
        cx: i32,
        cy: i32,
        radius: u32,
        color: Rgb,
        filled: bool,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: f32,
        color: Rgb,
        thickness: u32,
    },
}

/// Everything to draw on top of one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Overlay {
    pub iteration: u64,
    pub commands: Vec<DrawCommand>,
}

/// Inputs the overlay needs from one iteration.
pub struct OverlayInput<'a> {
    pub iteration: u64,
    pub blobs: &'a [CandidateBlob],
    pub line_height: u32,
    pub vehicle_count: u64,
    pub alert_active: bool,
    pub green_time_secs: u64,
}

pub fn build_overlay(input: &OverlayInput<'_>, style: &OverlayStyle) -> Overlay {
    let mut commands = Vec::with_capacity(input.blobs.len() * 3 + 3);
    let line_y = input.line_height as i32;

    for blob in input.blobs {
        let b = blob.bbox;
        commands.push(DrawCommand::Rectangle {
            x0: b.x as i32 - style.box_padding,
            y0: b.y as i32 - style.box_padding,
            x1: (b.x + b.width) as i32 + style.box_padding,
            y1: (b.y + b.height) as i32 + style.box_padding,
            color: style.box_color,
            thickness: 2,
        });
        commands.push(DrawCommand::Circle {
            cx: blob.centroid.x as i32,
            cy: blob.centroid.y as i32,
            radius: style.centroid_radius,
            color: style.centroid_color,
            filled: true,
        });
    }

    // The counting line is only drawn on frames that have candidates.
    if !input.blobs.is_empty() {
        commands.push(DrawCommand::Line {
            x0: 0,
            y0: line_y,
            x1: style.line_end_x,
            y1: line_y,
            color: style.line_color,
            thickness: 2,
        });
    }

    commands.push(DrawCommand::Text {
        x: 10,
        y: 90,
        text: format!("{}{}", COUNT_LABEL, input.vehicle_count),
        scale: 1.0,
        color: style.count_color,
        thickness: 2,
    });
    commands.push(DrawCommand::Text {
        x: 10,
        y: 130,
        text: format!("{}{}s", GREEN_TIME_LABEL, input.green_time_secs),
        scale: 1.0,
        color: style.count_color,
        thickness: 2,
    });

    if input.alert_active {
        commands.push(DrawCommand::Text {
            x: 410,
            y: 390,
            text: ALERT_LABEL.to_string(),
            scale: 2.0,
            color: style.alert_color,
            thickness: 4,
        });
    }

    Overlay {
        iteration: input.iteration,
        commands,
    }
}

/// Iteration sink that writes one overlay per line as JSON.
pub struct OverlayWriter<W: Write> {
    writer: W,
    style: OverlayStyle,
    written: u64,
}

impl<W: Write> OverlayWriter<W> {
    pub fn new(writer: W, style: OverlayStyle) -> Self {
        Self {
            writer,
            style,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> IterationSink for OverlayWriter<W> {
    fn on_iteration(&mut self, report: &IterationReport) -> anyhow::Result<()> {
        let overlay = report.overlay(&self.style);
        serde_json::to_writer(&mut self.writer, &overlay).context("encode overlay")?;
        self.writer.write_all(b"\n").context("write overlay")?;
        self.written += 1;
        Ok(())
    }
}
