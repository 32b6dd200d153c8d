//! Event admission, merge, and analyst edits.
//!
//! Events reported by descriptor sources are keyed by `(origin, local id)`.
//! An event is only admitted once every track it references exists;
//! re-submitting a key updates the admitted event in place.

use super::{Core, CoreError, DeferredEventRegion, EventRecord};
use crate::descriptor::Descriptor;
use crate::descriptor_input::{DescriptorInput, InputKind};
use crate::event::{Event, EventId, EventOrigin, EventRating, IqrClassification, LogicalEventId};
use crate::event_types::{EventGroup, EventInfo, EventTypeId};
use crate::geometry::{open_vertices, Polygon};
use crate::homography::Resolution;
use crate::notification::CoreNotification;
use crate::timestamp::TimeStamp;
use crate::track::RawTrack;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Raw tracks and descriptors overlapping a time interval.
#[derive(Debug, Clone, Default)]
pub struct QueryFormulationData {
    pub tracks: Vec<RawTrack>,
    pub descriptors: Vec<Descriptor>,
}

impl Core {
    // ========================================================================
    // ADMISSION
    // ========================================================================

    /// Accepts an event from `origin`, deferring it while any referenced
    /// track is still unknown.
    pub fn add_event(&mut self, origin: EventOrigin, mut event: Event) {
        let remaps: Vec<(EventTypeId, EventTypeId)> = event
            .classifiers
            .keys()
            .filter_map(|t| self.user_type_maps.get(&(origin, *t)).map(|u| (*t, *u)))
            .collect();
        for (from, to) in remaps {
            event.remap_classifier(from, to);
        }

        if event.classifiers.keys().any(|t| *t > 0)
            && !self.expected_groups.contains(&EventGroup::Classifier)
        {
            self.expect_event_group(EventGroup::Classifier);
        }

        if !self.event_tracks_known(&event) {
            debug!("Deferring event {} until its tracks exist", event.id);
            self.deferred_events.push((origin, event));
            return;
        }

        self.add_ready_event(origin, event);
    }

    fn event_tracks_known(&self, event: &Event) -> bool {
        event
            .tracks
            .iter()
            .all(|t| self.track_model_ids.contains_key(&t.track))
    }

    /// Admits events whose tracks have all appeared since they were deferred.
    pub(super) fn flush_deferred_events(&mut self) {
        if self.deferred_events.is_empty() {
            return;
        }
        let deferred = std::mem::take(&mut self.deferred_events);
        let mut still_waiting = Vec::new();
        for (origin, event) in deferred {
            if self.event_tracks_known(&event) {
                self.add_ready_event(origin, event);
            } else {
                still_waiting.push((origin, event));
            }
        }
        self.deferred_events = still_waiting;
    }

    pub fn deferred_event_count(&self) -> usize {
        self.deferred_events.len()
    }

    /// Admits an event whose tracks are known, merging it into an existing
    /// event when `(origin, event.id)` was seen before.
    ///
    /// Regions of source events are image-space and go through the
    /// homography map; regions of raw events are already stabilized. A
    /// resubmission without regions keeps the ones already stored.
    pub fn add_ready_event(&mut self, origin: EventOrigin, event: Event) -> EventId {
        let key = (origin, event.id);

        if let Some(id) = self.event_refs.get(&key).copied() {
            let replace_regions = !event.regions.is_empty();
            if let Some(record) = self.events.get_mut(&id) {
                record.event.update_from(&event);
                if origin.is_raw() && replace_regions {
                    record.event.regions = event.regions.clone();
                }
            }
            if !origin.is_raw() && replace_regions {
                self.purge_deferred_regions(id);
                if let Some(record) = self.events.get_mut(&id) {
                    record.event.regions.clear();
                }
                self.set_event_regions(id, event.regions);
            }
            self.notify_event_modified(id);
            return id;
        }

        let id = EventId(self.next_event_id);
        self.next_event_id += 1;

        if !origin.is_raw() {
            if let Some(alert_type) = event.sole_classifier() {
                if let Some(alert) = self.alerts.get_mut(&alert_type) {
                    alert.matches.insert(id);
                    let count = alert.matches.len();
                    self.notify(CoreNotification::AlertMatchesChanged {
                        id: alert_type,
                        count,
                    });
                }
            }
        }

        let mut stored = event;
        let regions = if origin.is_raw() {
            BTreeMap::new()
        } else {
            std::mem::take(&mut stored.regions)
        };
        self.event_refs.insert(key, id);
        self.events.insert(
            id,
            EventRecord {
                ground_truth: stored.is_ground_truth(),
                event: stored,
                origin,
                inputs: Vec::new(),
            },
        );
        self.set_event_regions(id, regions);

        self.notify(CoreNotification::EventAdded(id));
        self.notify(CoreNotification::Updated);
        self.emit_event_snapshot(id);
        id
    }

    fn logical_id_of(&self, id: EventId) -> Option<LogicalEventId> {
        self.events.get(&id).map(|r| LogicalEventId {
            uuid: r.event.uuid,
            model_id: id,
            source_local_id: r.event.id,
            origin: r.origin,
        })
    }

    /// Emits the current state of an event as a new `Event` input.
    fn emit_event_snapshot(&mut self, id: EventId) {
        let Some(logical) = self.logical_id_of(id) else {
            return;
        };
        let Some(event) = self.events.get(&id).map(|r| r.event.clone()) else {
            return;
        };
        let input = self.emit_input(DescriptorInput::Event { id: logical, event });
        if let Some(record) = self.events.get_mut(&id) {
            record.inputs.push(input);
        }
    }

    /// Publishes a change and replaces the event's live input with a fresh
    /// snapshot. Superseded inputs leave the history without a revocation.
    fn notify_event_modified(&mut self, id: EventId) {
        self.notify(CoreNotification::EventChanged(id));
        self.notify(CoreNotification::Updated);

        let superseded = self
            .events
            .get(&id)
            .map(|r| r.inputs.clone())
            .unwrap_or_default();
        for input in superseded {
            self.history.remove(input);
        }
        self.emit_event_snapshot(id);
    }

    // ========================================================================
    // REGIONS
    // ========================================================================

    fn set_event_regions(&mut self, id: EventId, regions: BTreeMap<TimeStamp, Polygon>) {
        for (time, region) in regions {
            self.add_event_region(id, time, region);
        }
    }

    /// Places one image-space region. Returns true if it was stored now.
    fn add_event_region(&mut self, id: EventId, time: TimeStamp, region: Polygon) -> bool {
        match self
            .homographies
            .resolve(time, self.config.homography_tolerance_us)
        {
            Resolution::Exact(h) | Resolution::Nearest(_, h) => match self.events.get_mut(&id) {
                Some(record) => {
                    record.event.regions.insert(time, h.apply_all(&region));
                    true
                }
                None => false,
            },
            Resolution::Defer => {
                self.deferred_regions
                    .entry(time)
                    .or_default()
                    .push(DeferredEventRegion { event: id, region });
                false
            }
            Resolution::Discard => {
                warn!(
                    "Discarding region of event {} at {}: no homography within {} us",
                    id, time, self.config.homography_tolerance_us
                );
                false
            }
        }
    }

    pub(super) fn flush_deferred_event_regions(&mut self) {
        let Some(watermark) = self.homographies.watermark() else {
            return;
        };
        let later = self.deferred_regions.split_off(&watermark.shifted(1));
        let ready = std::mem::replace(&mut self.deferred_regions, later);

        let mut added = false;
        for (time, regions) in ready {
            for deferred in regions {
                added |= self.add_event_region(deferred.event, time, deferred.region);
            }
        }
        if added {
            self.notify(CoreNotification::Updated);
        }
    }

    fn purge_deferred_regions(&mut self, id: EventId) {
        self.deferred_regions.retain(|_, regions| {
            regions.retain(|r| r.event != id);
            !regions.is_empty()
        });
    }

    pub fn deferred_region_count(&self) -> usize {
        self.deferred_regions.values().map(Vec::len).sum()
    }

    // ========================================================================
    // REMOVAL
    // ========================================================================

    /// Removes an admitted event, or failing that, a still-deferred one.
    /// Returns false if neither matched.
    pub fn remove_event(&mut self, origin: EventOrigin, source_local_id: i64) -> bool {
        let Some(id) = self.event_refs.remove(&(origin, source_local_id)) else {
            let position = self
                .deferred_events
                .iter()
                .position(|(o, e)| *o == origin && e.id == source_local_id);
            return match position {
                Some(index) => {
                    self.deferred_events.remove(index);
                    true
                }
                None => false,
            };
        };

        let Some(record) = self.events.remove(&id) else {
            return false;
        };
        for input in record.inputs {
            self.revoke_input(InputKind::Event, input, false);
        }
        self.purge_deferred_regions(id);

        let mut changed = Vec::new();
        for (alert_type, alert) in self.alerts.iter_mut() {
            if alert.matches.remove(&id) {
                changed.push((*alert_type, alert.matches.len()));
            }
        }
        for (alert_type, count) in changed {
            self.notify(CoreNotification::AlertMatchesChanged {
                id: alert_type,
                count,
            });
        }

        self.notify(CoreNotification::EventRemoved(id));
        self.notify(CoreNotification::Updated);
        true
    }

    // ========================================================================
    // MANUAL EVENTS
    // ========================================================================

    /// Creates an analyst event of `type_id` from a stabilized region.
    pub fn create_manual_event(
        &mut self,
        type_id: EventTypeId,
        region: &[nalgebra::Point2<f64>],
        time: TimeStamp,
    ) -> EventId {
        let local_id = self.next_raw_event_id;
        self.next_raw_event_id += 1;

        let mut event = Event::new(local_id)
            .with_classifier(type_id, 1.0)
            .with_span(time, time)
            .with_region(time, open_vertices(region).to_vec());
        event.flags.user_created = true;
        event.flags.modifiable = true;

        self.expect_event_group(EventGroup::User);
        let id = self.add_ready_event(EventOrigin::Raw, event);
        self.notify(CoreNotification::ManualEventCreated(id));
        id
    }

    /// Maps a source-local event type into the user range and registers it.
    ///
    /// The mapping is stable per `(origin, type)`; later events from the
    /// origin have their classifiers remapped.
    pub fn add_event_type(
        &mut self,
        origin: EventOrigin,
        mut info: EventInfo,
        threshold: f64,
    ) -> EventTypeId {
        let key = (origin, info.type_id);
        let user_type = match self.user_type_maps.get(&key) {
            Some(t) => *t,
            None => {
                let t = self.event_types.allocate_user_type();
                self.user_type_maps.insert(key, t);
                t
            }
        };

        info.type_id = user_type;
        self.event_types.register(info.clone());
        self.event_types.set_threshold(user_type, threshold);
        self.expect_event_group(EventGroup::User);
        self.notify(CoreNotification::UserEventTypeAdded { info, threshold });
        user_type
    }

    // ========================================================================
    // ANALYST EDITS
    // ========================================================================

    fn normal_event_mut(&mut self, id: EventId) -> Result<&mut EventRecord, CoreError> {
        let record = self.events.get_mut(&id).ok_or(CoreError::UnknownEvent(id))?;
        if record.ground_truth {
            return Err(CoreError::GroundTruthEvent(id));
        }
        Ok(record)
    }

    pub fn set_event_rating(&mut self, id: EventId, rating: EventRating) -> Result<(), CoreError> {
        self.normal_event_mut(id)?;
        if let Some(logical) = self.logical_id_of(id) {
            self.emit_input(DescriptorInput::EventRating {
                id: logical,
                classification: IqrClassification::from(rating),
            });
        }
        self.normal_event_mut(id)?.event.rating = rating;
        self.notify(CoreNotification::EventRatingChanged { event: id, rating });
        Ok(())
    }

    pub fn set_event_status(&mut self, id: EventId, status: i32) -> Result<(), CoreError> {
        self.normal_event_mut(id)?.event.status = status;
        self.notify(CoreNotification::EventStatusChanged { event: id, status });
        Ok(())
    }

    /// Sets the analyst note. An empty note clears it.
    pub fn set_event_note(&mut self, id: EventId, note: &str) -> Result<(), CoreError> {
        let record = self.normal_event_mut(id)?;
        record.event.note = (!note.is_empty()).then(|| note.to_string());
        let (start, end) = (record.event.start, record.event.end);
        let stored = record.event.note.clone();

        self.notify(CoreNotification::EventNoteChanged {
            event: id,
            note: stored,
        });
        if let Some(logical) = self.logical_id_of(id) {
            self.emit_input(DescriptorInput::EventNote {
                id: logical,
                note: note.to_string(),
                start,
                end,
            });
        }
        Ok(())
    }

    fn modifiable_event_mut(&mut self, id: EventId) -> Result<&mut Event, CoreError> {
        let record = self.events.get_mut(&id).ok_or(CoreError::UnknownEvent(id))?;
        if !record.event.is_modifiable() {
            return Err(CoreError::NotModifiable(id));
        }
        Ok(&mut record.event)
    }

    /// Moves the start of a modifiable event. The start never passes the
    /// first region; the end is pushed along if needed. Returns true if the
    /// event changed.
    pub fn set_event_start(&mut self, id: EventId, time: TimeStamp) -> Result<bool, CoreError> {
        let event = self.modifiable_event_mut(id)?;
        let start = event.first_region_time().map_or(time, |first| time.min(first));
        if start == event.start {
            return Ok(false);
        }
        event.start = start;
        if event.end < start {
            event.end = start;
        }
        self.notify_event_modified(id);
        Ok(true)
    }

    /// Moves the end of a modifiable event. The end never precedes the last
    /// region; the start is pulled along if needed.
    pub fn set_event_end(&mut self, id: EventId, time: TimeStamp) -> Result<bool, CoreError> {
        let event = self.modifiable_event_mut(id)?;
        let end = event.last_region_time().map_or(time, |last| time.max(last));
        if end == event.end {
            return Ok(false);
        }
        event.end = end;
        if event.start > end {
            event.start = end;
        }
        self.notify_event_modified(id);
        Ok(true)
    }

    // ========================================================================
    // DESCRIPTORS & QUERIES
    // ========================================================================

    pub fn add_descriptors(&mut self, descriptors: Vec<Descriptor>) {
        self.descriptors.extend(descriptors);
    }

    /// Raw tracks and descriptors overlapping the open interval `(start, end)`.
    pub fn query_formulation_data(&self, start: TimeStamp, end: TimeStamp) -> QueryFormulationData {
        QueryFormulationData {
            tracks: self
                .raw_tracks
                .values()
                .filter(|t| t.overlaps(start, end))
                .cloned()
                .collect(),
            descriptors: self
                .descriptors
                .iter()
                .filter(|d| d.overlaps(start, end))
                .cloned()
                .collect(),
        }
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.get(&id).map(|r| &r.event)
    }

    pub fn events(&self) -> impl Iterator<Item = (EventId, &Event)> {
        self.events.iter().map(|(id, r)| (*id, &r.event))
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_ground_truth_event(&self, id: EventId) -> bool {
        self.events.get(&id).is_some_and(|r| r.ground_truth)
    }

    pub fn model_event_id(&self, origin: EventOrigin, source_local_id: i64) -> Option<EventId> {
        self.event_refs.get(&(origin, source_local_id)).copied()
    }

    pub fn logical_event_id(&self, id: EventId) -> Option<LogicalEventId> {
        self.logical_id_of(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests_support::{drain, ts};
    use crate::event_types::{Color, ANNOTATION};
    use crate::homography::Homography;
    use crate::track::{TrackId, TrackState, GROUND_TRUTH_SOURCE};
    use nalgebra::Point2;
    use vsplay_env::SourceId;

    fn source() -> EventOrigin {
        EventOrigin::Source(SourceId::from_seed(42))
    }

    fn core_with_track(track: TrackId) -> Core {
        let mut core = Core::with_defaults();
        core.ingest_homography(ts(0), Homography::identity());
        core.ingest_homography(ts(100), Homography::translation(1.0, 0.0));
        core.update_track(track, vec![TrackState::new(ts(0), 0.0, 0.0)]);
        core
    }

    fn square() -> Polygon {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_event_waits_for_tracks() {
        let mut core = Core::with_defaults();
        core.ingest_homography(ts(0), Homography::identity());
        let track = TrackId::new(1, 9);
        core.add_event(source(), Event::new(5).with_classifier(3, 0.9).with_track(track, ts(0), ts(0)));

        assert_eq!(core.event_count(), 0);
        assert_eq!(core.deferred_event_count(), 1);

        core.update_track(track, vec![TrackState::new(ts(0), 0.0, 0.0)]);
        assert_eq!(core.event_count(), 1);
        assert_eq!(core.deferred_event_count(), 0);
        assert!(core.model_event_id(source(), 5).is_some());
    }

    #[test]
    fn test_resubmission_merges_in_place() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        let mut rx = core.subscribe();

        core.add_event(source(), Event::new(5).with_classifier(3, 0.4).with_track(track, ts(0), ts(0)));
        let id = core.model_event_id(source(), 5).unwrap();
        core.add_event(source(), Event::new(5).with_classifier(3, 0.9).with_track(track, ts(0), ts(100)));

        assert_eq!(core.event_count(), 1);
        assert_eq!(core.model_event_id(source(), 5), Some(id));
        let event = core.event(id).unwrap();
        assert_eq!(event.classifiers[&3].probability, 0.9);
        assert_eq!(event.end, ts(100));

        let notes = drain(&mut rx);
        assert!(notes.contains(&CoreNotification::EventAdded(id)));
        assert!(notes.contains(&CoreNotification::EventChanged(id)));
        // Only the latest snapshot stays live
        assert_eq!(
            core.history
                .replay(InputKind::Event.into())
                .len(),
            1
        );
    }

    #[test]
    fn test_source_regions_are_stabilized_or_deferred() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        let event = Event::new(1)
            .with_track(track, ts(0), ts(300))
            .with_region(ts(100), square())
            .with_region(ts(300), square());
        core.add_event(source(), event);
        let id = core.model_event_id(source(), 1).unwrap();

        let regions = &core.event(id).unwrap().regions;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[&ts(100)][1], Point2::new(2.0, 0.0));
        assert_eq!(core.deferred_region_count(), 1);

        core.ingest_homography(ts(300), Homography::translation(5.0, 0.0));
        assert_eq!(core.deferred_region_count(), 0);
        assert_eq!(core.event(id).unwrap().regions[&ts(300)][0], Point2::new(5.0, 0.0));
    }

    #[test]
    fn test_resubmission_without_regions_keeps_regions() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        core.add_event(
            source(),
            Event::new(2)
                .with_track(track, ts(0), ts(300))
                .with_region(ts(100), square())
                .with_region(ts(300), square()),
        );
        let id = core.model_event_id(source(), 2).unwrap();
        assert_eq!(core.deferred_region_count(), 1);

        core.add_event(
            source(),
            Event::new(2).with_classifier(4, 0.6).with_track(track, ts(0), ts(300)),
        );
        let event = core.event(id).unwrap();
        assert_eq!(event.classifiers[&4].probability, 0.6);
        assert_eq!(event.regions.len(), 1);
        assert_eq!(event.regions[&ts(100)][1], Point2::new(2.0, 0.0));
        assert_eq!(core.deferred_region_count(), 1);

        // A resubmission that does carry regions still replaces them
        core.add_event(
            source(),
            Event::new(2)
                .with_track(track, ts(0), ts(300))
                .with_region(ts(0), square()),
        );
        let regions = &core.event(id).unwrap().regions;
        assert_eq!(regions.keys().copied().collect::<Vec<_>>(), vec![ts(0)]);
        assert_eq!(core.deferred_region_count(), 0);
    }

    #[test]
    fn test_raw_resubmission_without_regions_keeps_regions() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        core.add_event(
            EventOrigin::Raw,
            Event::new(6).with_track(track, ts(0), ts(0)).with_region(ts(0), square()),
        );
        let id = core.model_event_id(EventOrigin::Raw, 6).unwrap();
        core.add_event(EventOrigin::Raw, Event::new(6).with_track(track, ts(0), ts(100)));

        let event = core.event(id).unwrap();
        assert_eq!(event.end, ts(100));
        assert_eq!(event.regions[&ts(0)], square());
    }

    #[test]
    fn test_remove_event_purges_regions_and_inputs() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        core.add_event(
            source(),
            Event::new(1).with_track(track, ts(0), ts(0)).with_region(ts(900), square()),
        );
        assert_eq!(core.deferred_region_count(), 1);

        assert!(core.remove_event(source(), 1));
        assert_eq!(core.event_count(), 0);
        assert_eq!(core.deferred_region_count(), 0);
        assert!(core.history.replay(InputKind::Event.into()).is_empty());
        assert!(!core.remove_event(source(), 1));
    }

    #[test]
    fn test_remove_deferred_event() {
        let mut core = Core::with_defaults();
        core.add_event(source(), Event::new(3).with_track(TrackId::new(8, 8), ts(0), ts(0)));
        assert!(core.remove_event(source(), 3));
        assert_eq!(core.deferred_event_count(), 0);
    }

    #[test]
    fn test_user_type_remapping() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        let info = EventInfo::new(7, "Loitering", Color::rgb(1, 2, 3));
        let user = core.add_event_type(source(), info.clone(), 0.3);
        assert_eq!(core.add_event_type(source(), info, 0.3), user);
        assert!(user <= crate::event_types::USER_TYPE);
        assert_eq!(core.event_types().threshold(user), Some(0.3));

        core.add_event(source(), Event::new(1).with_classifier(7, 0.8).with_track(track, ts(0), ts(0)));
        let id = core.model_event_id(source(), 1).unwrap();
        assert!(core.event(id).unwrap().classifiers.contains_key(&user));
        assert!(core.expected_event_groups().contains(&EventGroup::User));
    }

    #[test]
    fn test_manual_event_and_span_edits() {
        let mut core = Core::with_defaults();
        let id = core.create_manual_event(ANNOTATION, &square(), ts(500));
        let event = core.event(id).unwrap();
        assert_eq!(event.regions[&ts(500)].len(), 3);
        assert!(event.flags.user_created && event.is_modifiable());
        assert_eq!(core.logical_event_id(id).unwrap().origin, EventOrigin::Raw);

        // Start can't move past the first region
        assert!(!core.set_event_start(id, ts(800)).unwrap());
        assert!(core.set_event_start(id, ts(200)).unwrap());
        assert_eq!(core.event(id).unwrap().start, ts(200));

        // End can't move before the last region
        assert!(!core.set_event_end(id, ts(100)).unwrap());
        assert!(core.set_event_end(id, ts(900)).unwrap());
        assert_eq!(core.event(id).unwrap().end, ts(900));
    }

    #[test]
    fn test_source_events_not_modifiable() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        core.add_event(source(), Event::new(1).with_track(track, ts(0), ts(0)));
        let id = core.model_event_id(source(), 1).unwrap();
        assert_eq!(core.set_event_start(id, ts(5)), Err(CoreError::NotModifiable(id)));
    }

    #[test]
    fn test_rating_note_status() {
        let track = TrackId::new(1, 1);
        let mut core = core_with_track(track);
        core.add_event(source(), Event::new(1).with_track(track, ts(0), ts(0)));
        let id = core.model_event_id(source(), 1).unwrap();

        core.set_event_rating(id, EventRating::Adjudicated).unwrap();
        core.set_event_status(id, 2).unwrap();
        core.set_event_note(id, "checked").unwrap();
        let event = core.event(id).unwrap();
        assert_eq!(event.rating, EventRating::Adjudicated);
        assert_eq!(event.status, 2);
        assert_eq!(event.note.as_deref(), Some("checked"));

        let ratings = core.history.replay(InputKind::EventRating.into());
        assert_eq!(ratings.len(), 1);
        assert!(matches!(
            ratings[0].1.as_ref(),
            DescriptorInput::EventRating {
                classification: IqrClassification::Positive,
                ..
            }
        ));
    }

    #[test]
    fn test_ground_truth_events_reject_edits() {
        let track = TrackId::new(GROUND_TRUTH_SOURCE, 1);
        let mut core = core_with_track(track);
        core.add_event(source(), Event::new(1).with_track(track, ts(0), ts(0)));
        let id = core.model_event_id(source(), 1).unwrap();
        assert!(core.is_ground_truth_event(id));
        assert_eq!(
            core.set_event_rating(id, EventRating::Excluded),
            Err(CoreError::GroundTruthEvent(id))
        );
    }

    #[test]
    fn test_query_formulation_data() {
        let mut core = Core::with_defaults();
        let track = TrackId::new(1, 1);
        core.update_track(
            track,
            vec![
                TrackState::new(ts(100), 0.0, 0.0),
                TrackState::new(ts(200), 0.0, 0.0),
            ],
        );
        core.add_descriptors(vec![Descriptor {
            name: "color".into(),
            module: "hist".into(),
            track: Some(track),
            region_times: vec![ts(120), ts(180)],
            values: vec![1.0],
        }]);

        let data = core.query_formulation_data(ts(150), ts(400));
        assert_eq!(data.tracks.len(), 1);
        assert_eq!(data.descriptors.len(), 1);
        assert!(core.query_formulation_data(ts(200), ts(400)).tracks.is_empty());
    }
}
