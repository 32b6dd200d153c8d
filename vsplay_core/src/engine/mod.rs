//! The reconciliation engine.
//!
//! `Core` owns every piece of shared state (tracks, events, deferred
//! queues, descriptor-input history, alerts, contours) and is only ever
//! mutated from one dispatch task. Its operations are split by concern:
//!
//! - `reconcile`: metadata/homography ingestion, track updates, deferral
//! - `events`: event admission, merge, regions, analyst edits
//! - `inputs`: descriptor sources, fan-out with replay, revocation
//! - `alerts` / `contours`: analyst-object lifecycles
//!
//! Track added/changed signals are coalesced and only published by
//! [`Core::flush_pending`], which the dispatch loop calls once per turn.

mod alerts;
mod contours;
mod events;
mod inputs;
mod reconcile;

pub use events::QueryFormulationData;

use crate::alert::Alert;
use crate::config::CoreConfig;
use crate::contour::Contour;
use crate::descriptor::Descriptor;
use crate::descriptor_input::{InputHistory, InputId, InputKinds};
use crate::event::{Event, EventId, EventOrigin};
use crate::event_types::{EventGroup, EventInfo, EventTypeId, EventTypeRegistry};
use crate::geometry::Polygon;
use crate::homography::HomographyMap;
use crate::metadata::FrameMetadata;
use crate::notification::{CoreNotification, NotificationBus, SourceKind};
use crate::source::DescriptorSource;
use crate::timestamp::TimeStamp;
use crate::track::{RawTrack, Track, TrackId, TrackModelId, TrackState};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use vsplay_env::{DataSourceStatus, SourceId};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("Unknown descriptor source: {0}")]
    UnknownSource(SourceId),

    #[error("Unknown event: {0}")]
    UnknownEvent(EventId),

    #[error("Event {0} belongs to the ground-truth model")]
    GroundTruthEvent(EventId),

    #[error("Event {0} is not modifiable")]
    NotModifiable(EventId),

    #[error("Unknown track: {0}")]
    UnknownTrack(TrackModelId),

    #[error("Track {0} belongs to the ground-truth model")]
    GroundTruthTrack(TrackModelId),

    #[error("Unknown alert type: {0}")]
    UnknownAlert(EventTypeId),

    #[error("Unknown contour: {0}")]
    UnknownContour(i32),
}

// ============================================================================
// INTERNAL RECORDS
// ============================================================================

/// Coalesced per-track signal; `Added` outranks `Changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TrackSignal {
    Changed,
    Added,
}

/// Track states waiting for a homography.
#[derive(Debug, Default)]
struct DeferredTrackUpdate {
    states: BTreeMap<TimeStamp, TrackState>,
    /// Close the track once the queue drains
    closed: bool,
}

/// An image-space event region waiting for a homography.
#[derive(Debug, Clone)]
struct DeferredEventRegion {
    event: EventId,
    region: Polygon,
}

#[derive(Debug, Clone)]
struct EventRecord {
    event: Event,
    origin: EventOrigin,
    ground_truth: bool,
    /// Every `Event` input emitted for this event, oldest first
    inputs: Vec<InputId>,
}

struct SourceSlot {
    source: Box<dyn DescriptorSource>,
    /// Set once the source signalled it is ready for input
    accepted: Option<InputKinds>,
    status: DataSourceStatus,
}

#[derive(Debug, Clone)]
struct AlertRecord {
    alert: Alert,
    enabled: bool,
    /// Every `Query` input emitted for this alert, oldest first
    input_ids: Vec<InputId>,
    matches: BTreeSet<EventId>,
}

#[derive(Debug, Clone)]
struct ContourRecord {
    contour: Contour,
    input_id: InputId,
}

// ============================================================================
// CORE
// ============================================================================

pub struct Core {
    config: CoreConfig,
    bus: NotificationBus,

    // === Geometry ===
    homographies: HomographyMap,
    frame_metadata: BTreeMap<TimeStamp, FrameMetadata>,
    /// Earliest frame time seen per homography reference frame
    reference_times: HashMap<u32, TimeStamp>,

    // === Tracks ===
    raw_tracks: BTreeMap<TrackId, RawTrack>,
    tracks: BTreeMap<TrackModelId, Track>,
    track_model_ids: HashMap<TrackId, TrackModelId>,
    next_track_id: u64,
    ground_truth_present: bool,
    deferred_tracks: BTreeMap<TrackId, DeferredTrackUpdate>,
    pending_signals: BTreeMap<TrackModelId, TrackSignal>,
    followed_track: Option<TrackModelId>,
    followed_time: Option<TimeStamp>,

    // === Events ===
    events: BTreeMap<EventId, EventRecord>,
    event_refs: HashMap<(EventOrigin, i64), EventId>,
    deferred_events: Vec<(EventOrigin, Event)>,
    deferred_regions: BTreeMap<TimeStamp, Vec<DeferredEventRegion>>,
    next_event_id: u64,
    next_raw_event_id: i64,
    user_type_maps: HashMap<(EventOrigin, EventTypeId), EventTypeId>,
    event_types: EventTypeRegistry,
    manual_event_types: Vec<EventInfo>,
    expected_groups: BTreeSet<EventGroup>,
    descriptors: Vec<Descriptor>,

    // === Descriptor inputs ===
    history: InputHistory,
    sources: BTreeMap<SourceId, SourceSlot>,
    next_source_seed: u64,
    collected_inputs: InputKinds,
    persistent_alerts_loaded: bool,
    tripwire_source: Option<SourceId>,
    feed_status: HashMap<SourceKind, DataSourceStatus>,

    // === Analyst objects ===
    alerts: BTreeMap<EventTypeId, AlertRecord>,
    contours: BTreeMap<i32, ContourRecord>,
    next_contour_id: i32,
}

impl Core {
    pub fn new(config: CoreConfig) -> Self {
        let mut core = Self {
            config: CoreConfig::default(),
            bus: NotificationBus::new(),
            homographies: HomographyMap::new(),
            frame_metadata: BTreeMap::new(),
            reference_times: HashMap::new(),
            raw_tracks: BTreeMap::new(),
            tracks: BTreeMap::new(),
            track_model_ids: HashMap::new(),
            next_track_id: 1,
            ground_truth_present: false,
            deferred_tracks: BTreeMap::new(),
            pending_signals: BTreeMap::new(),
            followed_track: None,
            followed_time: None,
            events: BTreeMap::new(),
            event_refs: HashMap::new(),
            deferred_events: Vec::new(),
            deferred_regions: BTreeMap::new(),
            next_event_id: 1,
            next_raw_event_id: 1,
            user_type_maps: HashMap::new(),
            event_types: EventTypeRegistry::with_builtins(),
            manual_event_types: Vec::new(),
            expected_groups: BTreeSet::new(),
            descriptors: Vec::new(),
            history: InputHistory::new(),
            sources: BTreeMap::new(),
            next_source_seed: 1,
            collected_inputs: InputKinds::empty(),
            persistent_alerts_loaded: false,
            tripwire_source: None,
            feed_status: HashMap::new(),
            alerts: BTreeMap::new(),
            contours: BTreeMap::new(),
            next_contour_id: 1,
        };

        for info in &config.manual_event_types {
            core.register_manual_event_type(info.clone());
        }
        core.config = config;
        core
    }

    pub fn with_defaults() -> Self {
        Self::new(CoreConfig::default())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Subscribes to core notifications.
    pub fn subscribe(&mut self) -> UnboundedReceiver<CoreNotification> {
        self.bus.subscribe()
    }

    fn notify(&mut self, notification: CoreNotification) {
        self.bus.publish(notification);
    }

    // ========================================================================
    // END OF TURN
    // ========================================================================

    /// Runs the end-of-turn work: handles everything descriptor sources
    /// produced, then publishes the coalesced track signals.
    pub fn flush_pending(&mut self) {
        self.collect_source_outputs();
        self.flush_update_signals();
    }

    fn post_track_signal(&mut self, id: TrackModelId, signal: TrackSignal) {
        self.pending_signals
            .entry(id)
            .and_modify(|s| *s = (*s).max(signal))
            .or_insert(signal);
    }

    fn flush_update_signals(&mut self) {
        let pending = std::mem::take(&mut self.pending_signals);
        if !pending.is_empty() {
            debug!("Flushing {} coalesced track signals", pending.len());
        }
        for (id, signal) in pending {
            self.notify(match signal {
                TrackSignal::Added => CoreNotification::TrackAdded(id),
                TrackSignal::Changed => CoreNotification::TrackChanged(id),
            });
        }
    }

    // ========================================================================
    // EVENT TYPES
    // ========================================================================

    /// Records that events of `group` should be expected, and notifies.
    pub fn expect_event_group(&mut self, group: EventGroup) {
        self.expected_groups.insert(group);
        self.notify(CoreNotification::EventGroupExpected(group));
    }

    pub fn expected_event_groups(&self) -> &BTreeSet<EventGroup> {
        &self.expected_groups
    }

    pub fn event_types(&self) -> &EventTypeRegistry {
        &self.event_types
    }

    fn register_manual_event_type(&mut self, mut info: EventInfo) -> EventTypeId {
        let id = self.event_types.allocate_user_type();
        info.type_id = id;
        self.event_types.register(info.clone());
        self.manual_event_types.push(info);
        id
    }

    /// Adds an analyst ("manual") event type and returns its user type id.
    pub fn add_manual_event_type(&mut self, info: EventInfo) -> EventTypeId {
        let id = self.register_manual_event_type(info);
        self.notify(CoreNotification::ManualEventTypesUpdated(
            self.manual_event_types.clone(),
        ));
        id
    }

    pub fn manual_event_types(&self) -> &[EventInfo] {
        &self.manual_event_types
    }
}


#[cfg(test)]
pub(crate) mod tests_support {
    use crate::notification::CoreNotification;
    use crate::timestamp::TimeStamp;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub fn ts(us: i64) -> TimeStamp {
        TimeStamp::from_micros(us)
    }

    /// Everything published so far.
    pub fn drain(rx: &mut UnboundedReceiver<CoreNotification>) -> Vec<CoreNotification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }
}
