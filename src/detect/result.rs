use serde::{Deserialize, Serialize};

/// Default minimum bounding-box width for a blob to count as a vehicle candidate.
pub const DEFAULT_MIN_CONTOUR_WIDTH: u32 = 40;
/// Default minimum bounding-box height for a blob to count as a vehicle candidate.
pub const DEFAULT_MIN_CONTOUR_HEIGHT: u32 = 40;

/// Axis-aligned bounding box in pixel coordinates. `x`/`y` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Geometric centre of the box using floor division.
    ///
    /// This is not the centre of mass of the foreground pixels; centroid accuracy is
    /// bounded by box granularity.
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// A connected foreground region that passed the size filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CandidateBlob {
    pub bbox: BoundingBox,
    pub centroid: Point,
}

impl CandidateBlob {
    pub fn from_bbox(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            centroid: bbox.center(),
        }
    }
}

/// Blob size filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub min_contour_width: u32,
    pub min_contour_height: u32,
}

impl DetectionSettings {
    pub fn accepts(&self, bbox: &BoundingBox) -> bool {
        bbox.width >= self.min_contour_width && bbox.height >= self.min_contour_height
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_contour_width: DEFAULT_MIN_CONTOUR_WIDTH,
            min_contour_height: DEFAULT_MIN_CONTOUR_HEIGHT,
        }
    }
}
