//! Connected-region extraction from a motion mask.
//!
//! Regions are 8-connected. Each is reduced to its axis-aligned bounding box and
//! dropped unless the box meets the minimum width and height. Seeds are visited in
//! row-major order, so blobs come out ordered by their first (top-most, then left-most)
//! pixel.

use crate::detect::motion::MotionMask;
use crate::detect::result::{BoundingBox, CandidateBlob, DetectionSettings};

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Bounding boxes of every connected foreground region, before size filtering.
pub fn connected_regions(mask: &MotionMask) -> Vec<BoundingBox> {
    let (w, h) = (mask.width(), mask.height());
    let mut visited = vec![false; w as usize * h as usize];
    let mut regions = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y as usize * w as usize + x as usize;
            if visited[idx] || !mask.is_foreground(x, y) {
                continue;
            }

            visited[idx] = true;
            stack.push((x, y));
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

            while let Some((cx, cy)) = stack.pop() {
                min_x = min_x.min(cx);
                min_y = min_y.min(cy);
                max_x = max_x.max(cx);
                max_y = max_y.max(cy);

                for (dx, dy) in NEIGHBOURS {
                    let nx = cx as i32 + dx;
                    let ny = cy as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let nidx = ny as usize * w as usize + nx as usize;
                    if !visited[nidx] && mask.is_foreground(nx, ny) {
                        visited[nidx] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            regions.push(BoundingBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            });
        }
    }

    regions
}

/// Regions that pass the size filter, with their box-centre centroids.
pub fn extract_blobs(mask: &MotionMask, settings: &DetectionSettings) -> Vec<CandidateBlob> {
    connected_regions(mask)
        .into_iter()
        .filter(|bbox| settings.accepts(bbox))
        .map(CandidateBlob::from_bbox)
        .collect()
}
