//! Descriptor sources and the descriptor-input fan-out.
//!
//! Every emission gets the next input id and stays in the history until
//! revoked. A source that signals readiness is first replayed every live
//! entry its mask accepts, in id order, and then sees live emissions.

use super::{Core, CoreError, SourceSlot};
use crate::descriptor_input::{DescriptorInput, InputId, InputKind, InputKinds};
use crate::event::EventOrigin;
use crate::event_types::EventGroup;
use crate::notification::{CoreNotification, SourceKind};
use crate::persistence::{discover_alert_files, load_alert};
use crate::source::{DescriptorSource, SourceOutput};
use crate::tripwire::TripwireDescriptor;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vsplay_env::{DataSourceStatus, SourceId};

impl Core {
    // ========================================================================
    // SOURCES
    // ========================================================================

    /// Registers a descriptor source. It receives nothing until
    /// [`Core::connect_descriptor_inputs`] is called for it.
    pub fn add_descriptor_source(&mut self, source: Box<dyn DescriptorSource>) -> SourceId {
        let id = SourceId::from_seed(self.next_source_seed);
        self.next_source_seed += 1;
        info!("Descriptor source '{}' registered as {}", source.name(), id);
        self.sources.insert(
            id,
            SourceSlot {
                source,
                accepted: None,
                status: DataSourceStatus::NoSource,
            },
        );
        id
    }

    /// Marks a source ready for input and replays the live history it
    /// accepts.
    pub fn connect_descriptor_inputs(&mut self, id: SourceId) -> Result<(), CoreError> {
        let slot = self.sources.get_mut(&id).ok_or(CoreError::UnknownSource(id))?;
        let mask = slot.source.accepted_inputs();
        slot.accepted = Some(mask);

        let replay = self.history.replay(mask);
        debug!("Replaying {} inputs to {}", replay.len(), id);
        for (input_id, input) in replay {
            slot.source.inject_input(input_id, input);
        }

        self.update_descriptor_inputs();
        Ok(())
    }

    pub fn remove_descriptor_source(&mut self, id: SourceId) -> Result<(), CoreError> {
        let slot = self.sources.remove(&id).ok_or(CoreError::UnknownSource(id))?;
        info!("Descriptor source '{}' ({}) removed", slot.source.name(), id);
        if self.tripwire_source == Some(id) {
            self.tripwire_source = None;
        }
        self.update_descriptor_inputs();
        self.publish_descriptor_status();
        Ok(())
    }

    pub fn descriptor_source_count(&self) -> usize {
        self.sources.len()
    }

    /// Union of the masks of every connected source.
    pub fn collected_inputs(&self) -> InputKinds {
        self.collected_inputs
    }

    fn update_descriptor_inputs(&mut self) {
        let mask = self
            .sources
            .values()
            .filter_map(|s| s.accepted)
            .fold(InputKinds::empty(), |acc, m| acc | m);
        if mask == self.collected_inputs {
            return;
        }

        self.collected_inputs = mask;
        self.notify(CoreNotification::AcceptedInputsChanged(mask));

        if !self.persistent_alerts_loaded && mask.contains(InputKind::Query) {
            self.persistent_alerts_loaded = true;
            self.load_persistent_alerts();
        }
    }

    /// Starts the built-in tripwire descriptor the first time it is needed.
    pub(super) fn ensure_tripwire_source(&mut self) {
        if self.tripwire_source.is_some() {
            return;
        }
        let id = self.add_descriptor_source(Box::new(TripwireDescriptor::new()));
        self.tripwire_source = Some(id);
        if let Err(e) = self.connect_descriptor_inputs(id) {
            warn!("Unable to connect tripwire descriptor: {}", e);
        }
        self.expect_event_group(EventGroup::General);
    }

    // ========================================================================
    // FAN-OUT
    // ========================================================================

    /// Records an input and delivers it to every connected source whose
    /// mask accepts it.
    pub(super) fn emit_input(&mut self, input: DescriptorInput) -> InputId {
        let kind = input.kind();
        let (id, input) = self.history.push(input);
        for slot in self.sources.values_mut() {
            if slot.accepted.is_some_and(|m| m.contains(kind)) {
                slot.source.inject_input(id, Arc::clone(&input));
            }
        }
        id
    }

    /// Drops an input from the history. Revocable kinds are also withdrawn
    /// from connected sources, even if the entry was already superseded.
    pub(super) fn revoke_input(&mut self, kind: InputKind, id: InputId, revoke_events: bool) {
        self.history.remove(id);
        if !kind.is_revocable() {
            return;
        }
        for slot in self.sources.values_mut() {
            if slot.accepted.is_some_and(|m| m.contains(kind)) {
                slot.source.revoke_input(id, revoke_events);
            }
        }
    }

    /// Number of live entries in the input history.
    pub fn live_input_count(&self) -> usize {
        self.history.len()
    }

    // ========================================================================
    // SOURCE OUTPUT
    // ========================================================================

    pub(super) fn collect_source_outputs(&mut self) {
        loop {
            let outputs: Vec<(SourceId, SourceOutput)> = self
                .sources
                .iter_mut()
                .flat_map(|(id, slot)| {
                    let id = *id;
                    slot.source.drain_output().into_iter().map(move |o| (id, o))
                })
                .collect();
            if outputs.is_empty() {
                break;
            }
            for (id, output) in outputs {
                self.handle_source_output(id, output);
            }
        }
    }

    fn handle_source_output(&mut self, id: SourceId, output: SourceOutput) {
        let origin = EventOrigin::Source(id);
        match output {
            SourceOutput::Event(event) => self.add_event(origin, event),
            SourceOutput::RevokeEvent(local_id) => {
                self.remove_event(origin, local_id);
            }
            SourceOutput::EventType { info, threshold } => {
                self.add_event_type(origin, info, threshold);
            }
            SourceOutput::ExpectGroup(group) => self.expect_event_group(group),
            SourceOutput::Descriptor(descriptor) => self.add_descriptors(vec![descriptor]),
            SourceOutput::TrackClassification {
                track,
                classification,
            } => self.set_track_classification(track, classification),
            SourceOutput::Status(status) => {
                if let Some(slot) = self.sources.get_mut(&id) {
                    slot.status = status;
                }
                self.publish_descriptor_status();
            }
        }
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Records the status of the video or track feed.
    pub fn update_source_status(&mut self, kind: SourceKind, status: DataSourceStatus) {
        if self.feed_status.insert(kind, status) != Some(status) {
            self.notify(CoreNotification::SourceStatusChanged { kind, status });
        }
    }

    /// Current status of a feed. Descriptor status combines every source.
    pub fn source_status(&self, kind: SourceKind) -> DataSourceStatus {
        match kind {
            SourceKind::Descriptor => self
                .sources
                .values()
                .fold(DataSourceStatus::NoSource, |acc, s| acc.combine(s.status)),
            _ => self.feed_status.get(&kind).copied().unwrap_or_default(),
        }
    }

    fn publish_descriptor_status(&mut self) {
        let status = self.source_status(SourceKind::Descriptor);
        self.update_source_status(SourceKind::Descriptor, status);
    }

    // ========================================================================
    // PERSISTENT ALERTS
    // ========================================================================

    fn load_persistent_alerts(&mut self) {
        let files = discover_alert_files(&self.config.persistent_alerts);
        info!("Loading {} persistent alerts", files.len());
        for path in files {
            match load_alert(&path) {
                Ok(alert) => {
                    self.add_alert(alert);
                }
                Err(e) => {
                    warn!("Skipping alert file {}: {}", path.display(), e);
                    self.notify(CoreNotification::StatusMessage(format!(
                        "Unable to load alert {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingSource;
    use super::*;
    use crate::alert::{Alert, SimilarityQuery};
    use crate::engine::tests_support::{drain, ts};
    use crate::event::Event;
    use crate::homography::Homography;
    use crate::track::{TrackId, TrackState};

    #[test]
    fn test_late_joiner_gets_history_in_order() {
        let mut core = Core::with_defaults();
        core.ingest_homography(ts(0), Homography::identity());
        let track = TrackId::new(1, 1);
        for t in 0..5 {
            core.ingest_homography(ts(t * 10), Homography::identity());
            core.update_track(track, vec![TrackState::new(ts(t * 10), t as f64, 0.0)]);
        }

        let (src, log) = RecordingSource::new(InputKind::TrackUpdate.into());
        let id = core.add_descriptor_source(Box::new(src));
        assert!(log.lock().unwrap().injected.is_empty());
        core.connect_descriptor_inputs(id).unwrap();

        core.update_track(track, vec![TrackState::new(ts(40), 9.0, 0.0)]);

        let log = log.lock().unwrap();
        assert_eq!(log.injected.len(), 6);
        let ids: Vec<_> = log.injected.iter().map(|(id, _)| *id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(log
            .injected
            .iter()
            .all(|(_, i)| i.kind() == InputKind::TrackUpdate));
    }

    #[test]
    fn test_revocation_reaches_accepting_sources() {
        let mut core = Core::with_defaults();
        let (events_src, events_log) = RecordingSource::new(InputKind::Event.into());
        let (tracks_src, tracks_log) = RecordingSource::new(InputKind::TrackUpdate.into());
        let a = core.add_descriptor_source(Box::new(events_src));
        let b = core.add_descriptor_source(Box::new(tracks_src));
        core.connect_descriptor_inputs(a).unwrap();
        core.connect_descriptor_inputs(b).unwrap();

        core.add_event(EventOrigin::Raw, Event::new(1).with_span(ts(0), ts(1)));
        assert!(core.remove_event(EventOrigin::Raw, 1));

        assert_eq!(events_log.lock().unwrap().revoked.len(), 1);
        assert!(!events_log.lock().unwrap().revoked[0].1);
        assert!(tracks_log.lock().unwrap().revoked.is_empty());
    }

    #[test]
    fn test_collected_inputs_notified_on_change() {
        let mut core = Core::with_defaults();
        let mut rx = core.subscribe();
        let (src, _) = RecordingSource::new(InputKind::Event | InputKind::Contour);
        let id = core.add_descriptor_source(Box::new(src));
        core.connect_descriptor_inputs(id).unwrap();
        assert_eq!(core.collected_inputs(), InputKind::Event | InputKind::Contour);
        assert!(drain(&mut rx).contains(&CoreNotification::AcceptedInputsChanged(
            InputKind::Event | InputKind::Contour
        )));

        core.remove_descriptor_source(id).unwrap();
        assert!(core.collected_inputs().is_empty());
        assert_eq!(
            core.connect_descriptor_inputs(id),
            Err(CoreError::UnknownSource(id))
        );
    }

    #[test]
    fn test_source_events_flow_back_on_flush() {
        let mut core = Core::with_defaults();
        let (src, log) = RecordingSource::new(InputKinds::empty());
        let id = core.add_descriptor_source(Box::new(src));
        core.connect_descriptor_inputs(id).unwrap();

        log.lock()
            .unwrap()
            .pending
            .push(SourceOutput::Event(Event::new(11).with_classifier(4, 0.5)));
        assert_eq!(core.event_count(), 0);
        core.flush_pending();
        assert!(core.model_event_id(EventOrigin::Source(id), 11).is_some());

        log.lock().unwrap().pending.push(SourceOutput::RevokeEvent(11));
        core.flush_pending();
        assert_eq!(core.event_count(), 0);
    }

    #[test]
    fn test_descriptor_status_combines_sources() {
        let mut core = Core::with_defaults();
        assert_eq!(core.source_status(SourceKind::Descriptor), DataSourceStatus::NoSource);
        let (a, log_a) = RecordingSource::new(InputKinds::empty());
        let (b, log_b) = RecordingSource::new(InputKinds::empty());
        core.add_descriptor_source(Box::new(a));
        core.add_descriptor_source(Box::new(b));

        log_a.lock().unwrap().pending.push(SourceOutput::Status(DataSourceStatus::ArchivedActive));
        core.flush_pending();
        assert_eq!(core.source_status(SourceKind::Descriptor), DataSourceStatus::ArchivedActive);

        log_b.lock().unwrap().pending.push(SourceOutput::Status(DataSourceStatus::StreamingActive));
        core.flush_pending();
        assert_eq!(core.source_status(SourceKind::Descriptor), DataSourceStatus::MultipleSources);
    }

    #[test]
    fn test_persistent_alerts_load_once_for_query_sources() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.vsa");
        crate::persistence::write_alert(
            &Alert::new("Watch", SimilarityQuery::default(), 0.5),
            &good,
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.vsa"), "garbage;").unwrap();

        let config = crate::config::CoreConfig {
            persistent_alerts: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let mut core = Core::new(config);
        let mut rx = core.subscribe();

        let (src, log) = RecordingSource::new(InputKind::Query.into());
        let id = core.add_descriptor_source(Box::new(src));
        core.connect_descriptor_inputs(id).unwrap();

        assert_eq!(core.alert_ids().count(), 1);
        assert_eq!(log.lock().unwrap().injected.len(), 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, CoreNotification::StatusMessage(_))));

        let (again, _) = RecordingSource::new(InputKind::Query | InputKind::Event);
        let second = core.add_descriptor_source(Box::new(again));
        core.connect_descriptor_inputs(second).unwrap();
        assert_eq!(core.alert_ids().count(), 1);
    }
}
