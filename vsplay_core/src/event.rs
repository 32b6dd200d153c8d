//! Events: classified, time-bounded occurrences referencing tracks.

use crate::event_types::EventTypeId;
use crate::geometry::Polygon;
use crate::timestamp::TimeStamp;
use crate::track::TrackId;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;
use vsplay_env::SourceId;

// ============================================================================
// IDENTITY
// ============================================================================

/// Global (core-assigned) event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Who owns an event: a descriptor source, or the core itself (manual events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventOrigin {
    Raw,
    Source(SourceId),
}

impl EventOrigin {
    pub fn is_raw(&self) -> bool {
        matches!(self, EventOrigin::Raw)
    }
}

/// Full identity of an admitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalEventId {
    pub uuid: Uuid,
    pub model_id: EventId,
    pub source_local_id: i64,
    pub origin: EventOrigin,
}

// ============================================================================
// RATING
// ============================================================================

/// Analyst verdict on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventRating {
    #[default]
    None,
    Adjudicated,
    Excluded,
}

/// Relevance-feedback label derived from a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IqrClassification {
    Positive,
    Negative,
    Unclassified,
}

impl From<EventRating> for IqrClassification {
    fn from(rating: EventRating) -> Self {
        match rating {
            EventRating::Adjudicated => IqrClassification::Positive,
            EventRating::Excluded => IqrClassification::Negative,
            EventRating::None => IqrClassification::Unclassified,
        }
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// Score of one classifier type on an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    pub probability: f64,
    pub normalcy: f64,
}

/// A track participating in an event, with the span it participates for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventTrack {
    pub track: TrackId,
    pub start: TimeStamp,
    pub end: TimeStamp,
}

/// Where and when a tripwire was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripInfo {
    pub location: Point2<f64>,
    pub time: TimeStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventFlags {
    pub user_created: bool,
    pub modifiable: bool,
}

/// An event as produced by a source or held in the event model.
///
/// Regions are in image coordinates when produced by a descriptor source and
/// in stabilized coordinates once admitted (manual events are created in
/// stabilized coordinates directly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uuid: Uuid,
    /// Source-local id
    pub id: i64,
    pub classifiers: BTreeMap<EventTypeId, Classifier>,
    pub tracks: Vec<EventTrack>,
    pub start: TimeStamp,
    pub end: TimeStamp,
    pub regions: BTreeMap<TimeStamp, Polygon>,
    pub trip: Option<TripInfo>,
    pub rating: EventRating,
    pub status: i32,
    pub note: Option<String>,
    pub flags: EventFlags,
}

impl Event {
    pub fn new(id: i64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            classifiers: BTreeMap::new(),
            tracks: Vec::new(),
            start: TimeStamp::default(),
            end: TimeStamp::default(),
            regions: BTreeMap::new(),
            trip: None,
            rating: EventRating::None,
            status: 0,
            note: None,
            flags: EventFlags::default(),
        }
    }

    pub fn with_classifier(mut self, type_id: EventTypeId, probability: f64) -> Self {
        self.add_classifier(type_id, probability, 0.0);
        self
    }

    pub fn with_track(mut self, track: TrackId, start: TimeStamp, end: TimeStamp) -> Self {
        self.tracks.push(EventTrack { track, start, end });
        self
    }

    pub fn with_span(mut self, start: TimeStamp, end: TimeStamp) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_region(mut self, ts: TimeStamp, region: Polygon) -> Self {
        self.regions.insert(ts, region);
        self
    }

    pub fn add_classifier(&mut self, type_id: EventTypeId, probability: f64, normalcy: f64) {
        self.classifiers.insert(
            type_id,
            Classifier {
                probability,
                normalcy,
            },
        );
    }

    /// Moves a classifier score from one type to another.
    pub fn remap_classifier(&mut self, from: EventTypeId, to: EventTypeId) {
        if from == to {
            return;
        }
        if let Some(c) = self.classifiers.remove(&from) {
            self.classifiers.insert(to, c);
        }
    }

    /// The classifier type, if the event carries exactly one.
    pub fn sole_classifier(&self) -> Option<EventTypeId> {
        if self.classifiers.len() == 1 {
            self.classifiers.keys().next().copied()
        } else {
            None
        }
    }

    pub fn is_modifiable(&self) -> bool {
        self.flags.modifiable
    }

    pub fn first_region_time(&self) -> Option<TimeStamp> {
        self.regions.keys().next().copied()
    }

    pub fn last_region_time(&self) -> Option<TimeStamp> {
        self.regions.keys().next_back().copied()
    }

    /// True if the event references a ground-truth track.
    pub fn is_ground_truth(&self) -> bool {
        self.tracks.iter().any(|t| t.track.is_ground_truth())
    }

    /// Replaces producer-owned fields with those of a newer report.
    ///
    /// Analyst state (rating, status, note) and regions are left alone.
    pub fn update_from(&mut self, newer: &Event) {
        self.classifiers = newer.classifiers.clone();
        self.tracks = newer.tracks.clone();
        self.start = newer.start;
        self.end = newer.end;
        self.trip = newer.trip;
        self.flags = newer.flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sole_classifier() {
        let e = Event::new(1).with_classifier(7, 0.9);
        assert_eq!(e.sole_classifier(), Some(7));
        let e = e.with_classifier(8, 0.2);
        assert_eq!(e.sole_classifier(), None);
        assert_eq!(Event::new(2).sole_classifier(), None);
    }

    #[test]
    fn test_remap_classifier_keeps_score() {
        let mut e = Event::new(1).with_classifier(3, 0.75);
        e.remap_classifier(3, -5000);
        assert!(!e.classifiers.contains_key(&3));
        assert_eq!(e.classifiers[&-5000].probability, 0.75);
    }

    #[test]
    fn test_rating_to_iqr() {
        assert_eq!(
            IqrClassification::from(EventRating::Adjudicated),
            IqrClassification::Positive
        );
        assert_eq!(
            IqrClassification::from(EventRating::Excluded),
            IqrClassification::Negative
        );
        assert_eq!(
            IqrClassification::from(EventRating::None),
            IqrClassification::Unclassified
        );
    }

    #[test]
    fn test_update_from_preserves_analyst_state() {
        let mut e = Event::new(1).with_classifier(1, 0.5);
        e.rating = EventRating::Adjudicated;
        e.note = Some("keep".into());
        let newer = Event::new(1)
            .with_classifier(2, 0.8)
            .with_span(TimeStamp::from_micros(5), TimeStamp::from_micros(9));
        e.update_from(&newer);
        assert_eq!(e.sole_classifier(), Some(2));
        assert_eq!(e.end, TimeStamp::from_micros(9));
        assert_eq!(e.rating, EventRating::Adjudicated);
        assert_eq!(e.note.as_deref(), Some("keep"));
    }
}
