//! Tracks: logical identity, raw trajectories, and stabilized model tracks.

use crate::timestamp::TimeStamp;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Track source value reserved for ground-truth annotations.
pub const GROUND_TRUTH_SOURCE: i32 = -1;

// ============================================================================
// IDENTITY
// ============================================================================

/// Stable logical track identity as known to the producing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub source: i32,
    pub serial: i64,
}

impl TrackId {
    pub fn new(source: i32, serial: i64) -> Self {
        Self { source, serial }
    }

    pub fn is_ground_truth(&self) -> bool {
        self.source == GROUND_TRUTH_SOURCE
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T {}:{}", self.source, self.serial)
    }
}

/// Engine-internal track id, assigned on the first accepted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackModelId(pub u64);

impl fmt::Display for TrackModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// STATES
// ============================================================================

/// One positional sample of a track.
///
/// Producers deliver these in image coordinates; the model track stores
/// them after the frame homography has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub time: TimeStamp,
    pub point: Point2<f64>,
    /// Object outline; may be empty
    pub object: Vec<Point2<f64>>,
}

impl TrackState {
    pub fn new(time: TimeStamp, x: f64, y: f64) -> Self {
        Self {
            time,
            point: Point2::new(x, y),
            object: Vec::new(),
        }
    }

    pub fn with_object(mut self, object: Vec<Point2<f64>>) -> Self {
        self.object = object;
        self
    }
}

/// Track object classification (probability per coarse class).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackClassification {
    pub person: f64,
    pub vehicle: f64,
    pub other: f64,
}

// ============================================================================
// RAW TRAJECTORY
// ============================================================================

/// Unstabilized history of a logical track, kept for query formulation.
///
/// Every state a producer sends lands here, whether or not it could be
/// placed in stabilized space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    pub id: TrackId,
    pub trajectory: BTreeMap<TimeStamp, TrackState>,
    pub classification: Option<TrackClassification>,
}

impl RawTrack {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            trajectory: BTreeMap::new(),
            classification: None,
        }
    }

    pub fn first_time(&self) -> Option<TimeStamp> {
        self.trajectory.keys().next().copied()
    }

    pub fn last_time(&self) -> Option<TimeStamp> {
        self.trajectory.keys().next_back().copied()
    }

    /// True if the trajectory overlaps the open interval `(start, end)`.
    pub fn overlaps(&self, start: TimeStamp, end: TimeStamp) -> bool {
        match (self.first_time(), self.last_time()) {
            (Some(first), Some(last)) => first < end && start < last,
            _ => false,
        }
    }
}

// ============================================================================
// MODEL TRACK
// ============================================================================

/// A displayable track in stabilized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackModelId,
    pub logical_id: TrackId,
    pub name: String,
    pub states: BTreeMap<TimeStamp, TrackState>,
    pub classification: Option<TrackClassification>,
    pub note: Option<String>,
    pub closed: bool,
    /// Named scalar series attached by track sources
    pub scalars: BTreeMap<String, BTreeMap<TimeStamp, f64>>,
}

impl Track {
    pub fn new(id: TrackModelId, logical_id: TrackId) -> Self {
        Self {
            id,
            logical_id,
            name: logical_id.to_string(),
            states: BTreeMap::new(),
            classification: None,
            note: None,
            closed: false,
            scalars: BTreeMap::new(),
        }
    }

    pub fn start_time(&self) -> Option<TimeStamp> {
        self.states.keys().next().copied()
    }

    pub fn end_time(&self) -> Option<TimeStamp> {
        self.states.keys().next_back().copied()
    }

    pub fn set_state(&mut self, state: TrackState) {
        self.states.insert(state.time, state);
    }

    pub fn state_at(&self, ts: TimeStamp) -> Option<&TrackState> {
        self.states.get(&ts)
    }

    /// Latest state strictly before `ts`.
    pub fn prior_state(&self, ts: TimeStamp) -> Option<&TrackState> {
        self.states.range(..ts).next_back().map(|(_, s)| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(us: i64) -> TimeStamp {
        TimeStamp::from_micros(us)
    }

    #[test]
    fn test_ground_truth_id() {
        assert!(TrackId::new(GROUND_TRUTH_SOURCE, 3).is_ground_truth());
        assert!(!TrackId::new(1, 3).is_ground_truth());
        assert_eq!(TrackId::new(1, 7).to_string(), "T 1:7");
    }

    #[test]
    fn test_raw_track_overlap_is_open_interval() {
        let mut raw = RawTrack::new(TrackId::new(1, 1));
        assert!(!raw.overlaps(ts(0), ts(100)));
        raw.trajectory.insert(ts(10), TrackState::new(ts(10), 0.0, 0.0));
        raw.trajectory.insert(ts(20), TrackState::new(ts(20), 1.0, 0.0));
        assert!(raw.overlaps(ts(15), ts(100)));
        assert!(!raw.overlaps(ts(20), ts(100)));
        assert!(!raw.overlaps(ts(0), ts(10)));
    }

    #[test]
    fn test_prior_state() {
        let mut track = Track::new(TrackModelId(0), TrackId::new(1, 1));
        track.set_state(TrackState::new(ts(10), 0.0, 0.0));
        track.set_state(TrackState::new(ts(30), 3.0, 0.0));
        assert_eq!(track.prior_state(ts(30)).unwrap().time, ts(10));
        assert!(track.prior_state(ts(10)).is_none());
        assert_eq!(track.start_time(), Some(ts(10)));
        assert_eq!(track.end_time(), Some(ts(30)));
    }
}
