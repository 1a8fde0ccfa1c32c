//! Line-crossing counter.
//!
//! Every blob centroid seen in an iteration is appended to the pending list. The whole
//! pending list is then scanned once against the crossing band
//! `line_height - offset < y < line_height + offset`; matching points are counted and
//! removed. Points that never enter the band stay pending.
//!
//! A new centroid identical to one counted (or held back) in the previous iteration is
//! the same object still sitting in the band and is not added again.

use serde::{Deserialize, Serialize};

use crate::detect::{CandidateBlob, Point};

pub const DEFAULT_LINE_HEIGHT: u32 = 550;
pub const DEFAULT_CROSSING_OFFSET: u32 = 10;

/// Horizontal counting line and pending-point policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    /// Image row of the counting line.
    pub line_height: u32,
    /// Half-width of the open crossing band around the line.
    pub crossing_offset: u32,
    /// Evict points that stayed pending for more than this many iterations.
    /// `None` keeps them forever.
    pub max_pending_age: Option<u64>,
}

impl LineSettings {
    /// Open-interval band test.
    pub fn in_band(&self, point: &Point) -> bool {
        let y = point.y as i64;
        let line = self.line_height as i64;
        let offset = self.crossing_offset as i64;
        y > line - offset && y < line + offset
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            line_height: DEFAULT_LINE_HEIGHT,
            crossing_offset: DEFAULT_CROSSING_OFFSET,
            max_pending_age: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingCentroid {
    point: Point,
    first_seen: u64,
}

/// Running vehicle count plus the centroids not yet judged against the line.
#[derive(Clone, Debug, Default)]
pub struct CrossingCounter {
    settings: LineSettings,
    pending: Vec<PendingCentroid>,
    /// Centroids counted or held back in the previous iteration.
    recently_counted: Vec<Point>,
    count: u64,
    iteration: u64,
    evicted: u64,
}

impl CrossingCounter {
    pub fn new(settings: LineSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Feed one iteration's blobs. Returns how many vehicles were counted this iteration.
    pub fn observe(&mut self, blobs: &[CandidateBlob]) -> u64 {
        let iteration = self.iteration;
        self.iteration += 1;

        let mut held_back = Vec::new();
        for blob in blobs {
            if self.recently_counted.contains(&blob.centroid) {
                held_back.push(blob.centroid);
                continue;
            }
            self.pending.push(PendingCentroid {
                point: blob.centroid,
                first_seen: iteration,
            });
        }
        if !held_back.is_empty() {
            log::trace!("{} centroids still in band since last count", held_back.len());
        }

        // retain visits every element exactly once, in order; removing one point
        // never changes which of the others get evaluated.
        let settings = &self.settings;
        let mut crossed = Vec::new();
        self.pending.retain(|pending| {
            if settings.in_band(&pending.point) {
                crossed.push(pending.point);
                false
            } else {
                true
            }
        });
        let newly_counted = crossed.len() as u64;
        self.count += newly_counted;
        crossed.extend(held_back);
        self.recently_counted = crossed;

        if let Some(max_age) = self.settings.max_pending_age {
            let before = self.pending.len();
            self.pending
                .retain(|pending| iteration - pending.first_seen <= max_age);
            let dropped = (before - self.pending.len()) as u64;
            if dropped > 0 {
                self.evicted += dropped;
                log::trace!("evicted {} stale centroids", dropped);
            }
        }

        newly_counted
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.pending.iter().map(|pending| pending.point)
    }

    /// Points dropped by the age limit so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn settings(&self) -> &LineSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    /// Blob whose centroid lands exactly on `(cx, cy)`.
    fn blob_at(cx: u32, cy: u32) -> CandidateBlob {
        CandidateBlob::from_bbox(BoundingBox {
            x: cx - 20,
            y: cy - 20,
            width: 40,
            height: 40,
        })
    }

    #[test]
    fn centroid_on_line_is_counted() {
        let mut counter = CrossingCounter::default();
        assert_eq!(counter.observe(&[blob_at(100, 550)]), 1);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.pending_len(), 0);
    }

    #[test]
    fn band_edges_are_exclusive() {
        for y in [541, 559] {
            let mut counter = CrossingCounter::default();
            counter.observe(&[blob_at(100, y)]);
            assert_eq!(counter.count(), 1, "y={} should count", y);
        }
        for y in [540, 560, 500, 600] {
            let mut counter = CrossingCounter::default();
            counter.observe(&[blob_at(100, y)]);
            assert_eq!(counter.count(), 0, "y={} should not count", y);
            assert_eq!(counter.pending_len(), 1);
        }
    }

    #[test]
    fn counted_point_is_not_counted_again() {
        let mut counter = CrossingCounter::default();
        counter.observe(&[blob_at(100, 552)]);
        assert_eq!(counter.count(), 1);

        // Nothing new this iteration: the counted point is gone, so no double increment.
        assert_eq!(counter.observe(&[]), 0);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn stationary_centroid_in_band_is_counted_once() {
        let mut counter = CrossingCounter::default();
        assert_eq!(counter.observe(&[blob_at(100, 550)]), 1);
        assert_eq!(counter.observe(&[blob_at(100, 550)]), 0);
        assert_eq!(counter.observe(&[blob_at(100, 550)]), 0);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.pending_len(), 0);
    }

    #[test]
    fn centroid_reappearing_after_a_gap_counts_again() {
        let mut counter = CrossingCounter::default();
        counter.observe(&[blob_at(100, 550)]);
        counter.observe(&[]);
        assert_eq!(counter.observe(&[blob_at(100, 550)]), 1);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn moved_centroid_in_band_is_a_new_vehicle() {
        let mut counter = CrossingCounter::default();
        counter.observe(&[blob_at(100, 550)]);
        assert_eq!(counter.observe(&[blob_at(100, 552), blob_at(100, 550)]), 1);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn adjacent_matches_are_all_evaluated() {
        // Several consecutive matches in the pending list must all be removed; none may
        // be skipped because a neighbour was removed first.
        let mut counter = CrossingCounter::default();
        counter.observe(&[
            blob_at(50, 551),
            blob_at(150, 552),
            blob_at(250, 300),
            blob_at(350, 549),
            blob_at(450, 553),
        ]);
        assert_eq!(counter.count(), 4);
        let remaining: Vec<Point> = counter.pending_points().collect();
        assert_eq!(remaining, vec![Point { x: 250, y: 300 }]);
    }

    #[test]
    fn pending_points_carry_over_without_counting() {
        let mut counter = CrossingCounter::default();
        counter.observe(&[blob_at(100, 400)]);
        counter.observe(&[blob_at(100, 450)]);
        counter.observe(&[blob_at(100, 500)]);
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.pending_len(), 3);

        counter.observe(&[blob_at(100, 548)]);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.pending_len(), 3);
    }

    #[test]
    fn pending_points_are_kept_forever_by_default() {
        let mut counter = CrossingCounter::default();
        counter.observe(&[blob_at(100, 100)]);
        for _ in 0..1_000 {
            counter.observe(&[]);
        }
        assert_eq!(counter.pending_len(), 1);
        assert_eq!(counter.evicted(), 0);
    }

    #[test]
    fn optional_age_limit_evicts_stale_points() {
        let mut counter = CrossingCounter::new(LineSettings {
            max_pending_age: Some(2),
            ..LineSettings::default()
        });
        counter.observe(&[blob_at(100, 100)]); // iteration 0
        counter.observe(&[]); // 1
        counter.observe(&[]); // 2: age 2, kept
        assert_eq!(counter.pending_len(), 1);
        counter.observe(&[]); // 3: age 3, evicted
        assert_eq!(counter.pending_len(), 0);
        assert_eq!(counter.evicted(), 1);
    }

    #[test]
    fn offset_larger_than_line_does_not_underflow() {
        let settings = LineSettings {
            line_height: 5,
            crossing_offset: 10,
            max_pending_age: None,
        };
        assert!(settings.in_band(&Point { x: 0, y: 0 }));
        assert!(!settings.in_band(&Point { x: 0, y: 15 }));
    }
}
