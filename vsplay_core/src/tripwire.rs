//! Built-in tripwire descriptor.
//!
//! Watches stabilized track updates and tripwire contours, and reports an
//! event whenever a track segment crosses a wire:
//!
//! - open polyline: `TRIPWIRE`
//! - closed loop:   `ENTERING_REGION` / `EXITING_REGION`, or both when the
//!   segment crosses the boundary but starts and ends on the same side

use crate::contour::ContourType;
use crate::descriptor_input::{DescriptorInput, InputId, InputKind, InputKinds};
use crate::event::{Event, TripInfo};
use crate::event_types::{EventTypeId, ENTERING_REGION, EXITING_REGION, TRIPWIRE};
use crate::geometry::{self, Polygon};
use crate::source::{DescriptorSource, SourceOutput};
use crate::timestamp::TimeStamp;
use crate::track::TrackId;
use nalgebra::Point2;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Lead-in given to every crossing event.
pub const PRE_TRIP_DURATION_US: i64 = 3_000_000;

#[derive(Debug, Clone)]
struct Tripwire {
    /// Vertices without the closing duplicate
    points: Polygon,
    closed: bool,
    /// Source-local ids of events this wire produced
    events: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Crossing {
    Open,
    Entering,
    Exiting,
    Ambiguous,
}

#[derive(Debug, Clone, Copy)]
struct Intersection {
    wire: InputId,
    track: TrackId,
    pre: TimeStamp,
    post: TimeStamp,
    location: Point2<f64>,
    time: TimeStamp,
    crossing: Crossing,
}

pub struct TripwireDescriptor {
    wires: BTreeMap<InputId, Tripwire>,
    tracks: HashMap<TrackId, BTreeMap<TimeStamp, Point2<f64>>>,
    next_event_id: i64,
    output: Vec<SourceOutput>,
}

impl TripwireDescriptor {
    pub fn new() -> Self {
        Self {
            wires: BTreeMap::new(),
            tracks: HashMap::new(),
            next_event_id: 0,
            output: Vec::new(),
        }
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    fn add_wire(&mut self, id: InputId, points: &Polygon) {
        let closed = geometry::is_closed(points);
        let points = geometry::open_vertices(points).to_vec();
        if points.len() < 2 {
            return;
        }
        let wire = Tripwire {
            points,
            closed,
            events: Vec::new(),
        };

        // Check every known track against the new wire
        let mut hits = Vec::new();
        for (track, path) in &self.tracks {
            let samples: Vec<_> = path.iter().collect();
            for pair in samples.windows(2) {
                let (t0, p0) = pair[0];
                let (t1, p1) = pair[1];
                if let Some(hit) = check_segment(id, &wire, *track, *t0, p0, *t1, p1) {
                    hits.push(hit);
                }
            }
        }
        self.wires.insert(id, wire);
        hits.sort_by_key(|h| (h.post, h.track));
        self.process(hits);
    }

    fn update_track(&mut self, track: TrackId, time: TimeStamp, point: Point2<f64>) {
        let path = self.tracks.entry(track).or_default();
        path.insert(time, point);
        let Some((&pre_time, &pre_point)) = path.range(..time).next_back() else {
            return;
        };

        let hits: Vec<_> = self
            .wires
            .iter()
            .filter_map(|(id, wire)| {
                check_segment(*id, wire, track, pre_time, &pre_point, time, &point)
            })
            .collect();
        self.process(hits);
    }

    fn process(&mut self, hits: Vec<Intersection>) {
        for hit in hits {
            let track_start = self
                .tracks
                .get(&hit.track)
                .and_then(|p| p.keys().next().copied())
                .unwrap_or(hit.pre);

            let mut start = hit.post.shifted(-PRE_TRIP_DURATION_US);
            if hit.pre < start {
                start = hit.pre;
            } else if start < track_start {
                start = track_start;
            }

            let kinds: &[EventTypeId] = match hit.crossing {
                Crossing::Open => &[TRIPWIRE],
                Crossing::Entering => &[ENTERING_REGION],
                Crossing::Exiting => &[EXITING_REGION],
                Crossing::Ambiguous => &[ENTERING_REGION, EXITING_REGION],
            };
            for &kind in kinds {
                self.emit_event(&hit, kind, start);
            }
        }
    }

    fn emit_event(&mut self, hit: &Intersection, kind: EventTypeId, start: TimeStamp) {
        let id = self.next_event_id;
        self.next_event_id += 1;
        debug!("Tripwire {} crossed by {} at {}", hit.wire, hit.track, hit.time);

        let mut event = Event::new(id)
            .with_classifier(kind, 1.0)
            .with_track(hit.track, start, hit.post)
            .with_span(start, hit.post);
        event.trip = Some(TripInfo {
            location: hit.location,
            time: hit.time,
        });

        if let Some(wire) = self.wires.get_mut(&hit.wire) {
            wire.events.push(id);
        }
        self.output.push(SourceOutput::Event(event));
    }
}

impl Default for TripwireDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

fn check_segment(
    wire_id: InputId,
    wire: &Tripwire,
    track: TrackId,
    pre: TimeStamp,
    p0: &Point2<f64>,
    post: TimeStamp,
    p1: &Point2<f64>,
) -> Option<Intersection> {
    let (t, location) = geometry::edges(&wire.points, wire.closed)
        .iter()
        .filter_map(|(a, b)| geometry::segment_intersection(p0, p1, a, b))
        .min_by(|a, b| a.0.total_cmp(&b.0))?;

    let crossing = if wire.closed {
        let inside_before = geometry::contains_point(&wire.points, p0);
        let inside_after = geometry::contains_point(&wire.points, p1);
        match (inside_before, inside_after) {
            (false, true) => Crossing::Entering,
            (true, false) => Crossing::Exiting,
            _ => Crossing::Ambiguous,
        }
    } else {
        Crossing::Open
    };

    let span = (post.as_micros() - pre.as_micros()) as f64;
    let time = pre.shifted((span * t).round() as i64);
    Some(Intersection {
        wire: wire_id,
        track,
        pre,
        post,
        location,
        time,
        crossing,
    })
}

impl DescriptorSource for TripwireDescriptor {
    fn name(&self) -> &str {
        "Tripwire"
    }

    fn accepted_inputs(&self) -> InputKinds {
        InputKind::TrackUpdate | InputKind::Contour
    }

    fn inject_input(&mut self, id: InputId, input: Arc<DescriptorInput>) {
        match input.as_ref() {
            DescriptorInput::TrackUpdate { track, state } => {
                self.update_track(*track, state.time, state.point);
            }
            DescriptorInput::Contour(contour) if contour.kind == ContourType::Tripwire => {
                self.add_wire(id, &contour.points);
            }
            _ => {}
        }
    }

    fn revoke_input(&mut self, id: InputId, revoke_events: bool) {
        if let Some(wire) = self.wires.remove(&id) {
            if revoke_events {
                self.output
                    .extend(wire.events.into_iter().map(SourceOutput::RevokeEvent));
            }
        }
    }

    fn drain_output(&mut self) -> Vec<SourceOutput> {
        std::mem::take(&mut self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Contour;
    use crate::track::TrackState;

    fn ts(ms: i64) -> TimeStamp {
        TimeStamp::from_millis(ms)
    }

    fn update(track: TrackId, ms: i64, x: f64, y: f64) -> Arc<DescriptorInput> {
        Arc::new(DescriptorInput::TrackUpdate {
            track,
            state: TrackState::new(ts(ms), x, y),
        })
    }

    fn contour(kind: ContourType, points: Polygon) -> Arc<DescriptorInput> {
        Arc::new(DescriptorInput::Contour(Contour::new(1, "c", kind, points)))
    }

    fn vertical_wire() -> Polygon {
        vec![Point2::new(5.0, -10.0), Point2::new(5.0, 10.0)]
    }

    fn square_loop() -> Polygon {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
            Point2::new(0.0, 0.0),
        ]
    }

    fn events(out: Vec<SourceOutput>) -> Vec<Event> {
        out.into_iter()
            .filter_map(|o| match o {
                SourceOutput::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_open_wire_crossing() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(1, 1);
        d.inject_input(InputId(1), contour(ContourType::Tripwire, vertical_wire()));
        d.inject_input(InputId(2), update(track, 0, 0.0, 0.0));
        d.inject_input(InputId(3), update(track, 1_000, 10.0, 0.0));

        let evs = events(d.drain_output());
        assert_eq!(evs.len(), 1);
        let e = &evs[0];
        assert_eq!(e.sole_classifier(), Some(TRIPWIRE));
        assert_eq!(e.end, ts(1_000));
        // post - 3s is before the track start, pre is not earlier: clamp to track start
        assert_eq!(e.start, ts(0));
        assert_eq!(e.trip.unwrap().time, ts(500));
        assert_eq!(e.tracks[0].track, track);
    }

    #[test]
    fn test_old_pre_state_extends_start() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(1, 1);
        d.inject_input(InputId(1), contour(ContourType::Tripwire, vertical_wire()));
        d.inject_input(InputId(2), update(track, 0, 0.0, 0.0));
        d.inject_input(InputId(3), update(track, 10_000, 10.0, 0.0));
        let e = &events(d.drain_output())[0];
        assert_eq!(e.start, ts(0));
        assert_eq!(e.end, ts(10_000));
    }

    #[test]
    fn test_start_is_three_seconds_before_post() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(1, 1);
        d.inject_input(InputId(1), contour(ContourType::Tripwire, vertical_wire()));
        d.inject_input(InputId(2), update(track, 0, -20.0, 0.0));
        d.inject_input(InputId(3), update(track, 5_000, 0.0, 0.0));
        d.inject_input(InputId(4), update(track, 6_000, 10.0, 0.0));
        let e = &events(d.drain_output())[0];
        assert_eq!(e.start, ts(3_000));
    }

    #[test]
    fn test_loop_entering_and_exiting() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(1, 2);
        d.inject_input(InputId(1), contour(ContourType::Tripwire, square_loop()));
        d.inject_input(InputId(2), update(track, 0, -5.0, 5.0));
        d.inject_input(InputId(3), update(track, 100, 5.0, 5.0));
        d.inject_input(InputId(4), update(track, 200, 15.0, 5.0));

        let kinds: Vec<_> = events(d.drain_output())
            .iter()
            .map(|e| e.sole_classifier().unwrap())
            .collect();
        assert_eq!(kinds, vec![ENTERING_REGION, EXITING_REGION]);
    }

    #[test]
    fn test_loop_pass_through_emits_both() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(1, 3);
        d.inject_input(InputId(1), contour(ContourType::Tripwire, square_loop()));
        d.inject_input(InputId(2), update(track, 0, -5.0, 5.0));
        d.inject_input(InputId(3), update(track, 100, 15.0, 5.0));
        let kinds: Vec<_> = events(d.drain_output())
            .iter()
            .map(|e| e.sole_classifier().unwrap())
            .collect();
        assert_eq!(kinds, vec![ENTERING_REGION, EXITING_REGION]);
    }

    #[test]
    fn test_new_wire_checks_known_tracks() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(4, 4);
        d.inject_input(InputId(1), update(track, 0, 0.0, 0.0));
        d.inject_input(InputId(2), update(track, 100, 10.0, 0.0));
        assert!(d.drain_output().is_empty());

        d.inject_input(InputId(3), contour(ContourType::Tripwire, vertical_wire()));
        assert_eq!(events(d.drain_output()).len(), 1);
    }

    #[test]
    fn test_non_tripwire_contours_ignored() {
        let mut d = TripwireDescriptor::new();
        d.inject_input(InputId(1), contour(ContourType::Filter, square_loop()));
        assert_eq!(d.wire_count(), 0);
    }

    #[test]
    fn test_revoke_removes_wire_and_optionally_events() {
        let mut d = TripwireDescriptor::new();
        let track = TrackId::new(1, 1);
        d.inject_input(InputId(1), contour(ContourType::Tripwire, vertical_wire()));
        d.inject_input(InputId(2), update(track, 0, 0.0, 0.0));
        d.inject_input(InputId(3), update(track, 100, 10.0, 0.0));
        let id = events(d.drain_output())[0].id;

        d.revoke_input(InputId(1), true);
        assert_eq!(d.wire_count(), 0);
        assert_eq!(d.drain_output(), vec![SourceOutput::RevokeEvent(id)]);

        // Unknown ids are ignored
        d.revoke_input(InputId(99), true);
        assert!(d.drain_output().is_empty());
    }
}
