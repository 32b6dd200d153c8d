//! Descriptor sources used by the scenarios.
//!
//! - [`RecordingSource`] logs every input it is given
//! - [`EchoSource`] re-reports a fixed event per track on every update
//! - [`QueryResponder`] turns live similarity queries into matching events

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use vsplay_core::descriptor_input::{DescriptorInput, InputId, InputKind, InputKinds};
use vsplay_core::source::{DescriptorSource, SourceOutput};
use vsplay_core::{Event, EventTypeId, TrackId};
use vsplay_env::DataSourceStatus;

// ============================================================================
// RECORDING
// ============================================================================

/// Everything a [`RecordingSource`] was handed.
#[derive(Debug, Default, Clone)]
pub struct RecordLog {
    pub received: Vec<(InputId, Arc<DescriptorInput>)>,
    pub revoked: Vec<(InputId, bool)>,
}

impl RecordLog {
    /// Ids of `kind` that were delivered and not revoked since.
    pub fn live(&self, kind: InputKind) -> BTreeSet<InputId> {
        let revoked: BTreeSet<InputId> = self.revoked.iter().map(|(id, _)| *id).collect();
        self.received
            .iter()
            .filter(|(id, input)| input.kind() == kind && !revoked.contains(id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// True if ids were received in strictly increasing order.
    pub fn is_ordered(&self) -> bool {
        self.received.windows(2).all(|w| w[0].0 < w[1].0)
    }
}

/// Shared view of a recorder's log.
pub type SharedLog = Arc<Mutex<RecordLog>>;

/// Copies the current contents of a shared log.
pub fn snapshot(log: &SharedLog) -> RecordLog {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// A passive descriptor that records what it receives.
pub struct RecordingSource {
    name: String,
    mask: InputKinds,
    log: SharedLog,
}

impl RecordingSource {
    pub fn new(name: &str, mask: InputKinds) -> (Self, SharedLog) {
        let log = SharedLog::default();
        (
            Self {
                name: name.to_string(),
                mask,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl DescriptorSource for RecordingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_inputs(&self) -> InputKinds {
        self.mask
    }

    fn inject_input(&mut self, id: InputId, input: Arc<DescriptorInput>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .received
            .push((id, input));
    }

    fn revoke_input(&mut self, id: InputId, revoke_events: bool) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .revoked
            .push((id, revoke_events));
    }

    fn drain_output(&mut self) -> Vec<SourceOutput> {
        Vec::new()
    }
}

// ============================================================================
// ECHO
// ============================================================================

/// Re-submits the prepared event of a track every time the track updates.
pub struct EchoSource {
    events: BTreeMap<TrackId, Event>,
    output: Vec<SourceOutput>,
    submissions: Arc<Mutex<u64>>,
}

impl EchoSource {
    pub fn new(events: BTreeMap<TrackId, Event>) -> (Self, Arc<Mutex<u64>>) {
        let submissions = Arc::new(Mutex::new(0));
        (
            Self {
                events,
                output: Vec::new(),
                submissions: Arc::clone(&submissions),
            },
            submissions,
        )
    }
}

impl DescriptorSource for EchoSource {
    fn name(&self) -> &str {
        "Echo"
    }

    fn accepted_inputs(&self) -> InputKinds {
        InputKind::TrackUpdate.into()
    }

    fn inject_input(&mut self, _id: InputId, input: Arc<DescriptorInput>) {
        if let DescriptorInput::TrackUpdate { track, .. } = input.as_ref() {
            if let Some(event) = self.events.get(track) {
                self.output.push(SourceOutput::Event(event.clone()));
                *self
                    .submissions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) += 1;
            }
        }
    }

    fn revoke_input(&mut self, _id: InputId, _revoke_events: bool) {}

    fn drain_output(&mut self) -> Vec<SourceOutput> {
        std::mem::take(&mut self.output)
    }
}

// ============================================================================
// QUERY RESPONDER
// ============================================================================

#[derive(Debug, Default)]
struct QueryMatches {
    alert_type: EventTypeId,
    tracks: BTreeSet<TrackId>,
    events: Vec<i64>,
}

/// Stand-in for a similarity engine: every live query matches each track
/// once, on the track's next update.
///
/// A query revoked without `revoke_events` stops matching but keeps its
/// events until a later revocation asks for them.
pub struct QueryResponder {
    active: BTreeMap<InputId, QueryMatches>,
    retired: BTreeMap<InputId, Vec<i64>>,
    next_event_id: i64,
    output: Vec<SourceOutput>,
    reported_status: bool,
}

impl QueryResponder {
    pub fn new() -> Self {
        Self {
            active: BTreeMap::new(),
            retired: BTreeMap::new(),
            next_event_id: 1,
            output: Vec::new(),
            reported_status: false,
        }
    }
}

impl Default for QueryResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorSource for QueryResponder {
    fn name(&self) -> &str {
        "QueryResponder"
    }

    fn accepted_inputs(&self) -> InputKinds {
        InputKind::Query | InputKind::TrackUpdate
    }

    fn inject_input(&mut self, id: InputId, input: Arc<DescriptorInput>) {
        if !self.reported_status {
            self.reported_status = true;
            self.output
                .push(SourceOutput::Status(DataSourceStatus::InProcessActive));
        }

        match input.as_ref() {
            DescriptorInput::Query { alert_type, .. } => {
                self.active.insert(
                    id,
                    QueryMatches {
                        alert_type: *alert_type,
                        ..QueryMatches::default()
                    },
                );
            }
            DescriptorInput::TrackUpdate { track, state } => {
                for query in self.active.values_mut() {
                    if !query.tracks.insert(*track) {
                        continue;
                    }
                    let local_id = self.next_event_id;
                    self.next_event_id += 1;
                    query.events.push(local_id);
                    self.output.push(SourceOutput::Event(
                        Event::new(local_id)
                            .with_classifier(query.alert_type, 0.8)
                            .with_track(*track, state.time, state.time)
                            .with_span(state.time, state.time),
                    ));
                }
            }
            _ => {}
        }
    }

    fn revoke_input(&mut self, id: InputId, revoke_events: bool) {
        let events = match self.active.remove(&id) {
            Some(query) => query.events,
            None => match self.retired.remove(&id) {
                Some(events) => events,
                None => return,
            },
        };
        if revoke_events {
            self.output
                .extend(events.into_iter().map(SourceOutput::RevokeEvent));
        } else {
            self.retired.insert(id, events);
        }
    }

    fn drain_output(&mut self) -> Vec<SourceOutput> {
        std::mem::take(&mut self.output)
    }
}
