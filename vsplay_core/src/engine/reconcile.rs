//! Homography-dependent reconciliation of track updates.
//!
//! A track state can only be displayed once the homography of its frame is
//! known. States newer than the homography watermark are parked in a
//! per-track queue and replayed when metadata catches up.

use super::{Core, CoreError, TrackSignal};
use crate::descriptor_input::DescriptorInput;
use crate::homography::{nearest_entry, Homography, Resolution};
use crate::metadata::{FrameMetadata, GeoCoordinate};
use crate::notification::CoreNotification;
use crate::timestamp::TimeStamp;
use crate::track::{RawTrack, Track, TrackClassification, TrackId, TrackModelId, TrackState};
use nalgebra::Point2;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Frame metadata lookups for world mapping accept this much time skew.
const METADATA_MATCH_TOLERANCE_US: u64 = 10;

impl Core {
    // ========================================================================
    // METADATA
    // ========================================================================

    /// Ingests a batch of frame metadata.
    ///
    /// New homographies are stored and re-broadcast as `Metadata` inputs.
    /// The watermark then advances to the latest time in the batch and every
    /// deferred track state and event region it now covers is flushed.
    pub fn add_metadata(&mut self, metadata: Vec<FrameMetadata>) {
        let mut latest: Option<TimeStamp> = None;

        for md in metadata {
            if self.homographies.insert(md.time, md.homography) {
                self.emit_input(DescriptorInput::Metadata(md.clone()));
            }

            self.reference_times
                .entry(md.homography_reference_frame)
                .and_modify(|t| *t = (*t).min(md.time))
                .or_insert(md.time);

            latest = Some(latest.map_or(md.time, |l| l.max(md.time)));
            self.frame_metadata.insert(md.time, md);
        }

        if let Some(latest) = latest {
            self.homographies.advance_watermark(latest);
            self.flush_deferred_track_updates();
            self.flush_deferred_event_regions();
        }
    }

    /// Single-homography form of [`Core::add_metadata`].
    pub fn ingest_homography(&mut self, time: TimeStamp, homography: Homography) {
        self.add_metadata(vec![FrameMetadata::with_homography(time, homography)]);
    }

    pub fn homography_watermark(&self) -> Option<TimeStamp> {
        self.homographies.watermark()
    }

    /// Earliest known time of a homography reference frame.
    pub fn homography_reference_time(&self, frame: u32, best_guess: TimeStamp) -> TimeStamp {
        self.reference_times
            .get(&frame)
            .copied()
            .unwrap_or(best_guess)
    }

    fn metadata_near(&self, ts: TimeStamp) -> Option<&FrameMetadata> {
        nearest_entry(&self.frame_metadata, ts)
            .filter(|(at, _)| at.abs_diff(ts) <= METADATA_MATCH_TOLERANCE_US)
            .map(|(_, md)| md)
    }

    pub fn image_to_world(&self, point: &Point2<f64>, ts: TimeStamp) -> Option<GeoCoordinate> {
        self.metadata_near(ts)?.image_to_world(point)
    }

    pub fn stab_to_world(&self, point: &Point2<f64>, ts: TimeStamp) -> Option<GeoCoordinate> {
        self.metadata_near(ts)?.stab_to_world(point)
    }

    // ========================================================================
    // TRACK UPDATES
    // ========================================================================

    /// Applies a batch of image-space states to a track.
    pub fn update_track(&mut self, track: TrackId, states: Vec<TrackState>) {
        let mut accepted = false;
        for state in states {
            self.raw_tracks
                .entry(track)
                .or_insert_with(|| RawTrack::new(track))
                .trajectory
                .insert(state.time, state.clone());
            accepted |= self.place_track_state(track, state);
        }
        if accepted {
            self.notify(CoreNotification::Updated);
        }
    }

    /// Resolves the homography for one state and accepts, defers, or drops
    /// it. Returns true if the state was accepted.
    fn place_track_state(&mut self, track: TrackId, state: TrackState) -> bool {
        match self
            .homographies
            .resolve(state.time, self.config.homography_tolerance_us)
        {
            Resolution::Exact(h) | Resolution::Nearest(_, h) => {
                self.accept_track_state(track, state, &h);
                true
            }
            Resolution::Defer => {
                debug!("Deferring state of {} at {}", track, state.time);
                self.deferred_tracks
                    .entry(track)
                    .or_default()
                    .states
                    .insert(state.time, state);
                false
            }
            Resolution::Discard => {
                warn!(
                    "Discarding state of {} at {}: no homography within {} us",
                    track, state.time, self.config.homography_tolerance_us
                );
                false
            }
        }
    }

    fn accept_track_state(&mut self, track: TrackId, state: TrackState, h: &Homography) {
        let stabilized = TrackState {
            time: state.time,
            point: h.apply(&state.point),
            object: h.apply_all(&state.object),
        };

        let id = self.ensure_track(track);
        let is_first = self
            .tracks
            .get(&id)
            .map_or(true, |t| t.states.is_empty());
        if let Some(model) = self.tracks.get_mut(&id) {
            model.set_state(stabilized.clone());
        }
        self.post_track_signal(
            id,
            if is_first {
                TrackSignal::Added
            } else {
                TrackSignal::Changed
            },
        );

        self.emit_input(DescriptorInput::TrackUpdate {
            track,
            state: stabilized,
        });

        if self.followed_track == Some(id) && self.followed_time.map_or(true, |t| state.time > t) {
            let coordinate = self
                .frame_metadata
                .get(&state.time)
                .and_then(|md| md.image_to_world(&state.point));
            if let Some(coordinate) = coordinate {
                self.followed_time = Some(state.time);
                self.notify(CoreNotification::FollowedTrackState {
                    time: state.time,
                    coordinate,
                });
            }
        }
    }

    /// Returns the model id of a track, creating the track if needed.
    ///
    /// Creating a track may make deferred events admissible.
    fn ensure_track(&mut self, track: TrackId) -> TrackModelId {
        if let Some(id) = self.track_model_ids.get(&track) {
            return *id;
        }

        let id = TrackModelId(self.next_track_id);
        self.next_track_id += 1;
        self.track_model_ids.insert(track, id);
        self.tracks.insert(id, Track::new(id, track));
        if track.is_ground_truth() {
            self.ground_truth_present = true;
        }
        debug!("Created track {} for {}", id, track);

        self.flush_deferred_events();
        id
    }

    fn flush_deferred_track_updates(&mut self) {
        let Some(watermark) = self.homographies.watermark() else {
            return;
        };

        let mut accepted = false;
        let mut to_close = Vec::new();
        let pending: Vec<TrackId> = self.deferred_tracks.keys().copied().collect();

        for track in pending {
            let Some(queue) = self.deferred_tracks.get_mut(&track) else {
                continue;
            };
            let later = queue.states.split_off(&watermark.shifted(1));
            let ready = std::mem::replace(&mut queue.states, later);
            let drained = queue.states.is_empty();
            let close = drained && queue.closed;
            if drained {
                self.deferred_tracks.remove(&track);
            }

            for (_, state) in ready {
                accepted |= self.place_track_state(track, state);
            }
            if close {
                to_close.push(track);
            }
        }

        for track in to_close {
            self.close_track(track);
        }
        if accepted {
            self.notify(CoreNotification::Updated);
        }
    }

    /// Number of states of `track` waiting for a homography.
    pub fn deferred_state_count(&self, track: TrackId) -> usize {
        self.deferred_tracks
            .get(&track)
            .map_or(0, |q| q.states.len())
    }

    // ========================================================================
    // TRACK ATTRIBUTES
    // ========================================================================

    /// Marks a track as closed.
    ///
    /// If states of the track are still deferred, the close waits until
    /// the queue drains.
    pub fn close_track(&mut self, track: TrackId) {
        if let Some(queue) = self.deferred_tracks.get_mut(&track) {
            queue.closed = true;
            return;
        }

        let id = self.ensure_track(track);
        if let Some(model) = self.tracks.get_mut(&id) {
            model.closed = true;
        }
        self.emit_input(DescriptorInput::TrackClosure { track });
        self.notify(CoreNotification::TrackClosed(id));
        self.notify(CoreNotification::Updated);
    }

    pub fn set_track_classification(&mut self, track: TrackId, classification: TrackClassification) {
        self.raw_tracks
            .entry(track)
            .or_insert_with(|| RawTrack::new(track))
            .classification = Some(classification);

        let is_new = !self.track_model_ids.contains_key(&track);
        let id = self.ensure_track(track);
        if let Some(model) = self.tracks.get_mut(&id) {
            model.classification = Some(classification);
        }

        self.emit_input(DescriptorInput::TrackClassification {
            track,
            classification,
        });
        self.post_track_signal(
            id,
            if is_new {
                TrackSignal::Added
            } else {
                TrackSignal::Changed
            },
        );
    }

    /// Appends named scalar series to a track.
    pub fn update_track_data(
        &mut self,
        track: TrackId,
        data: BTreeMap<String, Vec<(TimeStamp, f64)>>,
    ) {
        let id = self.ensure_track(track);
        if let Some(model) = self.tracks.get_mut(&id) {
            for (name, values) in data {
                model.scalars.entry(name).or_default().extend(values);
            }
        }
        self.notify(CoreNotification::Updated);
    }

    /// Names of every scalar series attached to any track.
    pub fn dynamic_data_sets(&self) -> BTreeSet<String> {
        self.tracks
            .values()
            .flat_map(|t| t.scalars.keys().cloned())
            .collect()
    }

    /// Sets the analyst note of a (non ground-truth) track. An empty note
    /// clears it.
    pub fn set_track_note(&mut self, id: TrackModelId, note: &str) -> Result<(), CoreError> {
        let model = self.tracks.get_mut(&id).ok_or(CoreError::UnknownTrack(id))?;
        if model.logical_id.is_ground_truth() {
            return Err(CoreError::GroundTruthTrack(id));
        }

        model.note = (!note.is_empty()).then(|| note.to_string());
        let input = DescriptorInput::TrackNote {
            track: model.logical_id,
            note: note.to_string(),
            start: model.start_time(),
            end: model.end_time(),
        };
        let stored = model.note.clone();

        self.notify(CoreNotification::TrackNoteChanged {
            track: id,
            note: stored,
        });
        self.emit_input(input);
        Ok(())
    }

    // ========================================================================
    // FOLLOWING
    // ========================================================================

    /// Starts reporting world positions of `id` as new states arrive.
    pub fn start_following_track(&mut self, id: TrackModelId) -> Result<(), CoreError> {
        if !self.tracks.contains_key(&id) {
            return Err(CoreError::UnknownTrack(id));
        }
        self.followed_track = Some(id);
        self.followed_time = None;
        Ok(())
    }

    pub fn cancel_following(&mut self) {
        self.followed_track = None;
        self.followed_time = None;
    }

    pub fn followed_track(&self) -> Option<TrackModelId> {
        self.followed_track
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn track(&self, id: TrackModelId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn raw_track(&self, track: TrackId) -> Option<&RawTrack> {
        self.raw_tracks.get(&track)
    }

    pub fn model_track_id(&self, track: TrackId) -> Option<TrackModelId> {
        self.track_model_ids.get(&track).copied()
    }

    pub fn logical_track_id(&self, id: TrackModelId) -> Option<TrackId> {
        self.tracks.get(&id).map(|t| t.logical_id)
    }

    pub fn is_ground_truth_data_present(&self) -> bool {
        self.ground_truth_present
    }
}
