//! Homographies and the time-keyed homography store.
//!
//! Every raw (image-space) coordinate entering the engine must be mapped
//! into stabilized space with the homography of its frame. Homographies
//! arrive out-of-band, so lookups can resolve exactly, resolve to a nearby
//! frame, or have to wait for data that has not arrived yet.

use crate::timestamp::TimeStamp;
use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

/// 3x3 projective transform from image coordinates to stabilized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography(pub Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Pure translation by `(dx, dy)`.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0))
    }

    /// Applies the projective transform: (x, y, 1) -> (x/w, y/w).
    pub fn apply(&self, p: &Point2<f64>) -> Point2<f64> {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }

    pub fn apply_all(&self, points: &[Point2<f64>]) -> Vec<Point2<f64>> {
        points.iter().map(|p| self.apply(p)).collect()
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.0.try_inverse().map(Homography)
    }

    pub fn compose(&self, other: &Homography) -> Homography {
        Homography(self.0 * other.0)
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

/// Outcome of looking up the homography for a timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// A homography exists for exactly this timestamp
    Exact(Homography),
    /// No exact match, but one lies within tolerance
    Nearest(TimeStamp, Homography),
    /// Nothing newer has been seen yet; hold the data back
    Defer,
    /// Later homographies exist but none is close enough
    Discard,
}

/// Homographies keyed by timestamp plus the "latest homography" watermark.
#[derive(Debug, Clone, Default)]
pub struct HomographyMap {
    entries: BTreeMap<TimeStamp, Homography>,
    watermark: Option<TimeStamp>,
}

impl HomographyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a homography. Returns false if one was already present.
    pub fn insert(&mut self, ts: TimeStamp, h: Homography) -> bool {
        if self.entries.contains_key(&ts) {
            return false;
        }
        self.entries.insert(ts, h);
        true
    }

    /// Raises the watermark to `ts` if it is newer.
    pub fn advance_watermark(&mut self, ts: TimeStamp) {
        if self.watermark.map_or(true, |w| w < ts) {
            self.watermark = Some(ts);
        }
    }

    pub fn watermark(&self) -> Option<TimeStamp> {
        self.watermark
    }

    pub fn contains(&self, ts: TimeStamp) -> bool {
        self.entries.contains_key(&ts)
    }

    pub fn get(&self, ts: TimeStamp) -> Option<&Homography> {
        self.entries.get(&ts)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest stored homography. Ties go to the earlier timestamp.
    pub fn nearest(&self, ts: TimeStamp) -> Option<(TimeStamp, &Homography)> {
        nearest_entry(&self.entries, ts)
    }

    /// Decides how data stamped `ts` can be placed.
    pub fn resolve(&self, ts: TimeStamp, tolerance_us: u64) -> Resolution {
        if let Some(h) = self.entries.get(&ts) {
            return Resolution::Exact(*h);
        }
        match self.watermark {
            Some(w) if w >= ts => {}
            _ => return Resolution::Defer,
        }
        match self.nearest(ts) {
            Some((at, h)) if at.abs_diff(ts) <= tolerance_us => Resolution::Nearest(at, *h),
            _ => Resolution::Discard,
        }
    }
}

/// Nearest-key lookup shared by the homography and metadata maps.
pub(crate) fn nearest_entry<V>(
    map: &BTreeMap<TimeStamp, V>,
    ts: TimeStamp,
) -> Option<(TimeStamp, &V)> {
    let before = map.range(..=ts).next_back();
    let after = map
        .range((Bound::Excluded(ts), Bound::Unbounded))
        .next();
    match (before, after) {
        (Some((bt, bv)), Some((at, av))) => {
            if ts.abs_diff(*at) < ts.abs_diff(*bt) {
                Some((*at, av))
            } else {
                Some((*bt, bv))
            }
        }
        (Some((t, v)), None) | (None, Some((t, v))) => Some((*t, v)),
        (None, None) => None,
    }
}
