//! Scenario runner - drives the core through a synthetic video and checks
//! reconciliation invariants.
//!
//! Every scenario feeds the same kind of scene (seeded movers under a moving
//! camera) through a [`CoreService`] on a virtual clock. Scenarios differ in
//! how deliveries are delayed and reordered, and in which descriptor
//! sources and analyst actions are layered on top.

use crate::context::SimContext;
use crate::exporter::{MoverPosition, SimEvent, SimExport, SimFrame, TrackPosition};
use crate::oracle::{Oracle, SceneFrame};
use crate::recorder::{snapshot, EchoSource, QueryResponder, RecordingSource, SharedLog};
use crate::scenarios::ScenarioId;

use nalgebra::{Point2, Vector2};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use vsplay_core::event_types::TRIPWIRE;
use vsplay_core::metadata::FrameMetadata;
use vsplay_core::track::TrackState;
use vsplay_core::{
    Alert, ArchivedFeed, Contour, ContourType, Core, CoreConfig, CoreHandle, CoreMessage,
    CoreNotification, CoreService, DescriptorSource, Event, EventId, EventOrigin, EventTypeId,
    InputKind, SimilarityQuery, SourceKind, TrackId, TrackModelId,
};
use vsplay_env::{DataSourceStatus, SourceId, VsContext};

/// RNG stream for analyst actions (alert churn).
const STREAM_ANALYST: u64 = 0xA1;

/// Stabilized x of the tripwire drawn in the tripwire scenario.
const WIRE_X: f64 = 500.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Frames produced by the scene
    pub total_frames: u64,

    /// Final scene time in seconds
    pub final_time_secs: f64,

    /// Model tracks in the core at the end
    pub final_track_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Track observations generated by the scene
    pub observations: u64,

    /// Most track states waiting for a homography after any turn
    pub deferred_peak: usize,

    /// Core dispatch turns driven by the harness (0 for playback)
    pub core_turns: u64,

    /// Event reports handed to the core (including duplicates)
    pub event_submissions: u64,

    /// Events admitted over the run
    pub events_admitted: usize,

    /// Alert add/toggle/update/remove actions
    pub alert_operations: u64,

    /// Tripwire crossings reported
    pub tripwire_events: usize,

    /// Live descriptor inputs at the end
    pub live_inputs: usize,

    /// RMS distance of stabilized states to ground truth (pixels)
    pub rms_error: f64,
}

/// Runs reconciliation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Frames in the synthetic video
    frames: u64,

    /// Random movers in the scene
    movers: usize,

    frame_rate_hz: u32,
}

impl ScenarioRunner {
    /// Creates a runner for 300 frames (10 s at 30 fps) with 12 movers.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            frames: 300,
            movers: 12,
            frame_rate_hz: 30,
        }
    }

    /// Sets the number of frames (at least 30).
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames.max(30);
        self
    }

    pub fn with_movers(mut self, movers: usize) -> Self {
        self.movers = movers;
        self
    }

    pub fn with_frame_rate(mut self, hz: u32) -> Self {
        self.frame_rate_hz = hz.max(1);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario and records every frame for export.
    pub fn run_exported(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: bool) -> (ScenarioResult, Option<SimExport>) {
        info!(
            "Starting scenario: {} (seed={}, frames={})",
            scenario.name(),
            self.seed,
            self.frames
        );

        let plan = match scenario {
            ScenarioId::HomographyLag => DeliveryPlan::lagging_metadata(),
            ScenarioId::Jitter => DeliveryPlan::jittered(),
            _ => DeliveryPlan::in_order(),
        };
        let mut h = Harness::new(self, scenario, plan, export);

        match scenario {
            ScenarioId::InOrder | ScenarioId::HomographyLag | ScenarioId::Jitter => {
                h.run_frames(|_, _| {});
                h.finish();
            }
            ScenarioId::LateJoiner => self.run_late_joiner(&mut h),
            ScenarioId::DuplicateEvents => self.run_duplicate_events(&mut h),
            ScenarioId::AlertChurn => self.run_alert_churn(&mut h),
            ScenarioId::Tripwire => self.run_tripwire(&mut h),
            ScenarioId::Playback => self.run_playback(&mut h),
        }

        h.into_result()
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// A recorder attached from the start and one attached halfway must end
    /// up with identical input streams.
    fn run_late_joiner(&self, h: &mut Harness) {
        let mask = InputKind::Metadata | InputKind::TrackUpdate | InputKind::TrackClosure;
        let (early, early_log) = RecordingSource::new("early", mask);
        h.connect(Box::new(early));

        let join_at = self.frames / 2;
        let mut late_log: Option<SharedLog> = None;
        h.run_frames(|h, frame| {
            if frame.index != join_at {
                return;
            }
            let (late, log) = RecordingSource::new("late", mask);
            let id = h.service.core_mut().add_descriptor_source(Box::new(late));
            h.post(CoreMessage::SourceReady(id));
            h.process();
            h.note(format!("late recorder attached at frame {}", frame.index));
            late_log = Some(log);
        });
        h.finish();

        let Some(late_log) = late_log else {
            h.fail("late recorder never attached");
            return;
        };
        let early = snapshot(&early_log);
        let late = snapshot(&late_log);

        if !early.is_ordered() || !late.is_ordered() {
            h.fail("recorder saw input ids out of order");
        }
        if let Some(i) = early
            .received
            .iter()
            .zip(&late.received)
            .position(|(a, b)| a.0 != b.0 || a.1 != b.1)
        {
            h.fail(format!(
                "late joiner diverges at entry {}: {} vs {}",
                i, early.received[i].0, late.received[i].0
            ));
        }
        if early.received.len() != late.received.len() {
            h.fail(format!(
                "late joiner saw {} inputs, live recorder {}",
                late.received.len(),
                early.received.len()
            ));
        }
        info!(
            "Late joiner replay matched {} inputs",
            late.received.len()
        );
    }

    /// Every event is announced before its track exists, echoed on every
    /// track update, and re-posted when its track ends.
    fn run_duplicate_events(&self, h: &mut Harness) {
        let events: BTreeMap<TrackId, Event> = h
            .oracle
            .movers()
            .filter_map(|m| h.oracle.track_event(m.track, m.track.serial).map(|e| (m.track, e)))
            .collect();
        let (echo, echoes) = EchoSource::new(events.clone());
        let origin = EventOrigin::Source(h.connect(Box::new(echo)));

        for event in events.values() {
            h.post(CoreMessage::AddEvent {
                origin,
                event: event.clone(),
            });
        }
        h.process();
        let deferred = h.service.core().deferred_event_count();
        if deferred != events.len() {
            h.fail(format!(
                "{} of {} events deferred before any track existed",
                deferred,
                events.len()
            ));
        }

        h.run_frames(|h, frame| {
            for track in &frame.ended {
                if let Some(event) = events.get(track) {
                    h.post(CoreMessage::AddEvent {
                        origin,
                        event: event.clone(),
                    });
                }
            }
        });
        h.finish();

        let echoed = *echoes.lock().unwrap_or_else(PoisonError::into_inner);
        h.metrics.event_submissions = echoed + 2 * events.len() as u64;

        let core = h.service.core();
        let mut failures = Vec::new();
        if core.event_count() != events.len() {
            failures.push(format!(
                "{} events in the model for {} distinct reports",
                core.event_count(),
                events.len()
            ));
        }
        if core.deferred_event_count() != 0 {
            failures.push(format!(
                "{} events still deferred",
                core.deferred_event_count()
            ));
        }
        for (track, submitted) in &events {
            let Some(stored) = core
                .model_event_id(origin, submitted.id)
                .and_then(|id| core.event(id))
            else {
                failures.push(format!("event {} of {} missing", submitted.id, track));
                continue;
            };
            if stored.tracks.first().map(|t| t.track) != Some(*track) {
                failures.push(format!("event {} lost its track", submitted.id));
            }

            // The region is noise-free: its centre must land on the truth
            let first_frame = h.oracle.mover(*track).map_or(0, |m| m.first_frame);
            let truth = h.oracle.position_at(*track, first_frame);
            let centre = stored
                .regions
                .get(&submitted.start)
                .map(|region| region_centre(region));
            match (truth, centre) {
                (Some(truth), Some(centre)) if (truth - centre).norm() < 1e-6 => {}
                _ => failures.push(format!(
                    "event {} region not stabilized at {}",
                    submitted.id, submitted.start
                )),
            }
        }
        for f in failures {
            h.fail(f);
        }
    }

    /// Alerts are added, toggled, edited and removed at random while a
    /// query responder reports matches for every live query.
    fn run_alert_churn(&self, h: &mut Harness) {
        h.connect(Box::new(QueryResponder::new()));
        let (recorder, query_log) = RecordingSource::new("queries", InputKind::Query.into());
        h.connect(Box::new(recorder));

        let mut rng = h.context.derive_rng(STREAM_ANALYST);
        let mut serial = 0u32;

        h.run_frames(|h, _frame| {
            if !rng.gen_bool(0.2) {
                return;
            }
            let ids: Vec<EventTypeId> = h.service.core().alert_ids().collect();
            let op = if ids.is_empty() { 0 } else { rng.gen_range(0..4) };
            let pick = ids.get(rng.gen_range(0..ids.len().max(1))).copied();
            h.metrics.alert_operations += 1;

            let outcome = match (op, pick) {
                (0, _) if ids.len() < 4 => {
                    serial += 1;
                    let alert = churn_alert(serial);
                    h.with_core(|core| core.add_alert(alert));
                    Ok(())
                }
                (1, Some(id)) => {
                    let enabled = h.service.core().is_alert_enabled(id) == Some(true);
                    h.with_core(|core| core.set_alert_enabled(id, !enabled))
                }
                (2, Some(id)) => {
                    let mut alert = churn_alert(0);
                    alert.event_info.name = format!("renamed {}", id);
                    h.with_core(|core| core.update_alert(id, alert))
                }
                (3, Some(id)) => {
                    let remove_events = rng.gen_bool(0.5);
                    h.with_core(|core| core.remove_alert(id, remove_events).map(|_| ()))
                }
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                h.fail(format!("alert operation failed: {}", e));
            }
            h.check_alerts(&query_log);
        });

        let remaining: Vec<EventTypeId> = h.service.core().alert_ids().collect();
        for id in remaining {
            if let Err(e) = h.with_core(|core| core.remove_alert(id, true)) {
                h.fail(format!("final removal of alert {} failed: {}", id, e));
            }
        }
        h.finish();
        h.check_alerts(&query_log);

        let mut failures = Vec::new();
        if h.tally.alerts_added != h.tally.alerts_removed {
            failures.push(format!(
                "{} alerts added but {} removed",
                h.tally.alerts_added, h.tally.alerts_removed
            ));
        }
        let live = snapshot(&query_log).live(InputKind::Query).len();
        if live != 0 {
            failures.push(format!("{} queries still live after removal", live));
        }
        let leftover = h
            .service
            .core()
            .events()
            .filter(|(_, e)| {
                e.sole_classifier()
                    .is_some_and(|t| h.tally.purged_alert_types.contains(&t))
            })
            .count();
        if leftover != 0 {
            failures.push(format!("{} events of removed alerts survived", leftover));
        }
        for f in failures {
            h.fail(f);
        }
        info!(
            "Alert churn: {} operations, {} alerts",
            h.metrics.alert_operations, h.tally.alerts_added
        );
    }

    /// A tripwire is drawn a third of the way in; every crossing before and
    /// after must become exactly one event, and removing the wire with its
    /// events must remove them all.
    fn run_tripwire(&self, h: &mut Harness) {
        let last = self.frames - 1;
        h.oracle
            .spawn_mover(Vector2::new(WIRE_X - 20.0, 300.0), Vector2::new(40.0, 0.0), 0, last);
        h.oracle
            .spawn_mover(Vector2::new(WIRE_X + 20.0, 600.0), Vector2::new(-40.0, 0.0), 0, last);

        let wire_at = self.frames / 3;
        let mut wire: Option<i32> = None;
        h.run_frames(|h, frame| {
            if frame.index != wire_at {
                return;
            }
            let id = h.with_core(|core| {
                let id = core.create_contour_id();
                core.add_contour(Contour::new(
                    id,
                    "wire",
                    ContourType::Tripwire,
                    vec![Point2::new(WIRE_X, -1e5), Point2::new(WIRE_X, 1e5)],
                ));
                id
            });
            h.note(format!("tripwire {} drawn at frame {}", id, frame.index));
            wire = Some(id);
        });
        h.finish();

        let core = h.service.core();
        let expected: usize = core
            .tracks()
            .map(|t| {
                let xs: Vec<f64> = t.states.values().map(|s| s.point.x).collect();
                xs.windows(2)
                    .filter(|w| (w[0] - WIRE_X) * (w[1] - WIRE_X) < 0.0)
                    .count()
            })
            .sum();
        let trips: Vec<&Event> = core
            .events()
            .map(|(_, e)| e)
            .filter(|e| e.sole_classifier() == Some(TRIPWIRE))
            .collect();
        let misplaced = trips
            .iter()
            .filter(|e| {
                e.tracks.is_empty()
                    || e.trip.map_or(true, |trip| (trip.location.x - WIRE_X).abs() > 1e-6)
            })
            .count();
        let produced = trips.len();
        h.metrics.tripwire_events = produced;

        if expected == 0 || produced != expected {
            h.fail(format!(
                "{} tripwire events for {} crossings",
                produced, expected
            ));
        }
        if misplaced != 0 {
            h.fail(format!("{} tripwire events off the wire", misplaced));
        }

        let Some(wire) = wire else {
            h.fail("tripwire never drawn");
            return;
        };
        if let Err(e) = h.with_core(|core| core.remove_contour(wire, true)) {
            h.fail(format!("removing tripwire failed: {}", e));
        }
        let remaining = h
            .service
            .core()
            .events()
            .filter(|(_, e)| e.sole_classifier() == Some(TRIPWIRE))
            .count();
        if remaining != 0 {
            h.fail(format!("{} tripwire events survived wire removal", remaining));
        }
        info!("Tripwire: {} crossings reported", produced);
    }

    /// The whole scene is recorded as one archived track feed, then played
    /// through a spawned service. Sleeps between frames drive the virtual
    /// clock, so the run ends exactly one media span later.
    fn run_playback(&self, h: &mut Harness) {
        let mut feed = ArchivedFeed::new("scene", SourceKind::Track);
        for _ in 0..self.frames {
            let frame = h.oracle.step();
            feed.push(frame.time, CoreMessage::Metadata(vec![frame.metadata.clone()]));
            for obs in &frame.observations {
                feed.push(
                    frame.time,
                    CoreMessage::UpdateTrack {
                        track: obs.track,
                        states: vec![obs.state.clone()],
                    },
                );
            }
            for track in &frame.ended {
                feed.push(frame.time, CoreMessage::CloseTrack(*track));
            }
            h.metrics.observations += frame.observations.len() as u64;
        }
        let messages = feed.len();
        let span = feed.duration();

        let runtime = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                h.fail(format!("playback runtime failed to start: {}", e));
                return;
            }
        };

        let context = Arc::clone(&h.context);
        let started = context.now();
        let (service, handle) = h.detach_service();
        let feed_context = Arc::clone(&context);
        let (played, stopped, core) = runtime.block_on(async move {
            let finished = service.spawn();
            let played = feed.spawn(feed_context, handle.clone()).await;
            let stopped = handle.shutdown();
            (played, stopped, finished.await)
        });

        match played {
            Ok(Ok(posted)) if posted == messages => {}
            Ok(Ok(posted)) => h.fail(format!("feed posted {} of {} messages", posted, messages)),
            Ok(Err(e)) => h.fail(format!("feed stopped: {}", e)),
            Err(_) => h.fail("feed task ended without a result"),
        }
        if let Err(e) = stopped {
            h.fail(format!("shutdown failed: {}", e));
        }
        let Ok(core) = core else {
            h.fail("core service task ended without returning the core");
            return;
        };
        h.reattach(core);
        h.after_turn();

        let elapsed = context.now().saturating_sub(started);
        if elapsed != span {
            h.fail(format!(
                "playback took {:?} of virtual time for a {:?} feed",
                elapsed, span
            ));
        }
        if h.service.core().source_status(SourceKind::Track) != DataSourceStatus::ArchivedIdle {
            h.fail("track feed not reported idle after playback");
        }
        h.check_reconciliation();
    }
}

fn churn_alert(serial: u32) -> Alert {
    Alert::new(
        format!("alert {}", serial),
        SimilarityQuery {
            query_id: format!("q{}", serial),
            descriptors: vec!["color".to_string(), "shape".to_string()],
            similarity_threshold: 0.5,
        },
        0.3,
    )
}

fn region_centre(region: &[Point2<f64>]) -> Point2<f64> {
    let sum = region
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / region.len().max(1) as f64)
}

/// RMS distance between every stabilized model state and ground truth,
/// plus the number of states compared.
pub fn stabilization_error(core: &Core, oracle: &Oracle) -> (f64, usize) {
    let mut sum = 0.0;
    let mut samples = 0;
    for track in core.tracks() {
        for state in track.states.values() {
            if let Some(truth) = oracle.truth_at(track.logical_id, state.time) {
                sum += (state.point - truth).norm_squared();
                samples += 1;
            }
        }
    }
    if samples == 0 {
        (0.0, 0)
    } else {
        ((sum / samples as f64).sqrt(), samples)
    }
}

// ============================================================================
// DELIVERY
// ============================================================================

/// How deliveries are delayed (in frames) and ordered within a turn.
#[derive(Debug, Clone, Copy)]
struct DeliveryPlan {
    /// Inclusive range of metadata delay; metadata stays in frame order
    metadata_lag: (u64, u64),
    /// Inclusive range of per-state delay
    state_delay: (u64, u64),
    /// Shuffle states and place metadata at random within a turn
    shuffle: bool,
}

impl DeliveryPlan {
    fn in_order() -> Self {
        Self {
            metadata_lag: (0, 0),
            state_delay: (0, 0),
            shuffle: false,
        }
    }

    fn lagging_metadata() -> Self {
        Self {
            metadata_lag: (1, 6),
            ..Self::in_order()
        }
    }

    fn jittered() -> Self {
        Self {
            metadata_lag: (0, 2),
            state_delay: (0, 4),
            shuffle: true,
        }
    }
}

enum Delivery {
    Metadata(FrameMetadata),
    States(TrackId, Vec<TrackState>),
    Close(TrackId),
}

/// What the notification stream reported over the run.
#[derive(Debug, Default)]
struct Tally {
    track_added: HashMap<TrackModelId, usize>,
    events_added: BTreeSet<EventId>,
    duplicate_event_adds: usize,
    alerts_added: usize,
    alerts_removed: usize,
    purged_alert_types: BTreeSet<EventTypeId>,
}

// ============================================================================
// HARNESS
// ============================================================================

struct Harness {
    scenario: ScenarioId,
    seed: u64,
    frames: u64,
    context: Arc<SimContext>,
    oracle: Oracle,
    service: CoreService<SimContext>,
    handle: CoreHandle,
    notifications: UnboundedReceiver<CoreNotification>,
    plan: DeliveryPlan,
    pending: BTreeMap<u64, Vec<Delivery>>,
    last_metadata_arrival: u64,
    last_state_arrival: HashMap<TrackId, u64>,
    tally: Tally,
    metrics: ScenarioMetrics,
    notes: Vec<String>,
    export: Option<SimExport>,
    failures: Vec<String>,
}

impl Harness {
    fn new(runner: &ScenarioRunner, scenario: ScenarioId, plan: DeliveryPlan, export: bool) -> Self {
        let context = SimContext::shared(runner.seed);
        let physics_seed = runner.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let mut oracle = Oracle::new(physics_seed);
        oracle.set_frame_rate(runner.frame_rate_hz);
        oracle.spawn_random_movers(runner.movers, runner.frames);

        let mut core = Core::new(CoreConfig::default());
        let notifications = core.subscribe();
        let (service, handle) = CoreService::new(Arc::clone(&context), core);

        Self {
            scenario,
            seed: runner.seed,
            frames: runner.frames,
            context,
            oracle,
            service,
            handle,
            notifications,
            plan,
            pending: BTreeMap::new(),
            last_metadata_arrival: 0,
            last_state_arrival: HashMap::new(),
            tally: Tally::default(),
            metrics: ScenarioMetrics::default(),
            notes: Vec::new(),
            export: export.then(|| SimExport::new(scenario.name(), runner.seed)),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("{}: {}", self.scenario.name(), reason);
        self.failures.push(reason);
    }

    fn note(&mut self, message: String) {
        debug!("{}", message);
        self.notes.push(message);
    }

    fn post(&mut self, msg: CoreMessage) {
        if let Err(e) = self.handle.post(msg) {
            self.fail(format!("hand-off failed: {}", e));
        }
    }

    /// Takes the service out so it can run as its own task. An idle service
    /// stands in until [`Harness::reattach`].
    fn detach_service(&mut self) -> (CoreService<SimContext>, CoreHandle) {
        let (idle, idle_handle) =
            CoreService::new(Arc::clone(&self.context), Core::new(CoreConfig::default()));
        let service = std::mem::replace(&mut self.service, idle);
        let handle = std::mem::replace(&mut self.handle, idle_handle);
        (service, handle)
    }

    /// Puts a core handed back by a detached service under a fresh service.
    fn reattach(&mut self, core: Core) {
        let (service, handle) = CoreService::new(Arc::clone(&self.context), core);
        self.service = service;
        self.handle = handle;
    }

    /// Runs one dispatch turn over everything queued.
    fn process(&mut self) {
        self.service.process_ready();
        self.after_turn();
    }

    /// Runs analyst work directly on the core, then settles it.
    fn with_core<T>(&mut self, f: impl FnOnce(&mut Core) -> T) -> T {
        let out = f(self.service.core_mut());
        self.service.core_mut().flush_pending();
        self.after_turn();
        out
    }

    /// Registers and connects a descriptor source.
    fn connect(&mut self, source: Box<dyn DescriptorSource>) -> SourceId {
        let id = self.service.core_mut().add_descriptor_source(source);
        if let Err(e) = self.with_core(|core| core.connect_descriptor_inputs(id)) {
            self.fail(format!("connecting source failed: {}", e));
        }
        id
    }

    fn after_turn(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            match notification {
                CoreNotification::TrackAdded(id) => {
                    *self.tally.track_added.entry(id).or_default() += 1;
                }
                CoreNotification::EventAdded(id) => {
                    if !self.tally.events_added.insert(id) {
                        self.tally.duplicate_event_adds += 1;
                    }
                }
                CoreNotification::AlertAdded { .. } => self.tally.alerts_added += 1,
                CoreNotification::AlertRemoved { id, events_removed } => {
                    self.tally.alerts_removed += 1;
                    if events_removed {
                        self.tally.purged_alert_types.insert(id);
                    }
                }
                _ => {}
            }
        }

        let deferred = self.deferred_states();
        self.metrics.deferred_peak = self.metrics.deferred_peak.max(deferred);
    }

    fn deferred_states(&self) -> usize {
        let core = self.service.core();
        self.oracle
            .movers()
            .map(|m| core.deferred_state_count(m.track))
            .sum()
    }

    fn sample(&self, (lo, hi): (u64, u64)) -> u64 {
        if lo >= hi {
            lo
        } else {
            self.context.with_rng(|rng| rng.gen_range(lo..=hi))
        }
    }

    fn schedule(&mut self, tick: u64, delivery: Delivery) {
        self.pending.entry(tick).or_default().push(delivery);
    }

    // ========================================================================
    // FRAME LOOP
    // ========================================================================

    /// Produces every frame, calling `hook` after each frame's deliveries
    /// have been processed.
    fn run_frames(&mut self, mut hook: impl FnMut(&mut Harness, &SceneFrame)) {
        for _ in 0..self.frames {
            let frame = self.advance_frame();
            hook(self, &frame);
            self.end_frame(&frame);
        }
    }

    fn advance_frame(&mut self) -> SceneFrame {
        let frame = self.oracle.step();
        self.context
            .advance_time(Duration::from_micros(self.oracle.frame_interval_us() as u64));
        let index = frame.index;

        let md_at = (index + self.sample(self.plan.metadata_lag)).max(self.last_metadata_arrival);
        self.last_metadata_arrival = md_at;
        self.schedule(md_at, Delivery::Metadata(frame.metadata.clone()));

        for obs in &frame.observations {
            let at = index + self.sample(self.plan.state_delay);
            let last = self.last_state_arrival.entry(obs.track).or_default();
            *last = (*last).max(at);
            self.schedule(at, Delivery::States(obs.track, vec![obs.state.clone()]));
        }
        for track in &frame.ended {
            let at = self.last_state_arrival.get(track).copied().unwrap_or(index);
            self.schedule(at, Delivery::Close(*track));
        }
        self.metrics.observations += frame.observations.len() as u64;

        self.deliver(index);

        if index % 30 == 0 {
            debug!(
                "  frame {} | t={:.1}s | movers={} | tracks={} | deferred={}",
                index,
                self.oracle.time(),
                self.oracle.active_movers().len(),
                self.service.core().tracks().count(),
                self.deferred_states()
            );
        }
        frame
    }

    fn deliver(&mut self, tick: u64) {
        let Some(items) = self.pending.remove(&tick) else {
            return;
        };

        let mut metadata = Vec::new();
        let mut updates = Vec::new();
        let mut closes = Vec::new();
        for item in items {
            match item {
                Delivery::Metadata(md) => metadata.push(md),
                Delivery::States(track, states) => {
                    updates.push(CoreMessage::UpdateTrack { track, states })
                }
                Delivery::Close(track) => closes.push(CoreMessage::CloseTrack(track)),
            }
        }

        let metadata_first = if self.plan.shuffle {
            self.context.with_rng(|rng| {
                updates.shuffle(&mut *rng);
                rng.gen_bool(0.5)
            })
        } else {
            self.plan.metadata_lag.1 == 0
        };

        let mut batch = Vec::with_capacity(updates.len() + closes.len() + 1);
        let mut metadata = (!metadata.is_empty()).then(|| CoreMessage::Metadata(metadata));
        if metadata_first {
            batch.extend(metadata.take());
        }
        batch.extend(updates);
        batch.extend(metadata);
        batch.extend(closes);

        for msg in batch {
            self.post(msg);
        }
        self.process();
    }

    fn end_frame(&mut self, frame: &SceneFrame) {
        if self.export.is_none() {
            self.notes.clear();
            return;
        }

        let core = self.service.core();
        let ground_truth = self
            .oracle
            .active_movers()
            .into_iter()
            .filter_map(|m| {
                self.oracle
                    .position_at(m.track, frame.index)
                    .map(|p| MoverPosition::new(m.track, p))
            })
            .collect();
        let tracks = core
            .tracks()
            .filter_map(|t| {
                let state = t.state_at(frame.time)?;
                Some(TrackPosition {
                    track: t.logical_id.to_string(),
                    x: state.point.x,
                    y: state.point.y,
                    error: self
                        .oracle
                        .truth_at(t.logical_id, frame.time)
                        .map(|truth| (state.point - truth).norm()),
                })
            })
            .collect();
        let sim_frame = SimFrame {
            frame: frame.index,
            time_sec: frame.time.as_secs_f64(),
            ground_truth,
            tracks,
            event_count: core.event_count(),
            deferred_states: self.deferred_states(),
            events: self.notes.drain(..).map(SimEvent::info).collect(),
        };

        if let Some(export) = self.export.as_mut() {
            export.add_frame(sim_frame);
        }
    }

    /// Delivers everything still in flight, then checks the invariants
    /// every scenario shares.
    fn finish(&mut self) {
        while let Some((tick, _)) = self.pending.first_key_value() {
            let tick = *tick;
            self.deliver(tick);
        }
        self.check_reconciliation();
    }

    // ========================================================================
    // CHECKS
    // ========================================================================

    fn check_reconciliation(&mut self) {
        let core = self.service.core();
        let mut failures = Vec::new();

        for mover in self.oracle.movers() {
            let Some(id) = core.model_track_id(mover.track) else {
                failures.push(format!("{} never became a model track", mover.track));
                continue;
            };
            let added = self.tally.track_added.get(&id).copied().unwrap_or(0);
            if added != 1 {
                failures.push(format!("{} reported added {} times", mover.track, added));
            }
            if core.deferred_state_count(mover.track) != 0 {
                failures.push(format!("{} still has deferred states", mover.track));
            }
            if mover.last_frame < self.frames && !core.track(id).is_some_and(|t| t.closed) {
                failures.push(format!("{} was not closed", mover.track));
            }
        }

        let accepted: usize = core.tracks().map(|t| t.states.len()).sum();
        if accepted != self.oracle.observation_count() {
            failures.push(format!(
                "{} states accepted of {} observed",
                accepted,
                self.oracle.observation_count()
            ));
        }

        let (rms, samples) = stabilization_error(core, &self.oracle);
        let duration = self.frames as f64 * self.oracle.frame_interval_us() as f64 * 1e-6;
        let threshold = 3.0 * self.oracle.position_noise() * (1.0 + 0.005 * duration) + 1e-6;
        if rms > threshold {
            failures.push(format!(
                "stabilized RMS error {:.3}px over {} states exceeds {:.3}px",
                rms, samples, threshold
            ));
        }
        self.metrics.rms_error = rms;

        let last_frame = self.oracle.frame_time(self.frames - 1);
        if core.homography_watermark() != Some(last_frame) {
            failures.push(format!(
                "watermark {:?} does not match the last frame {}",
                core.homography_watermark(),
                last_frame
            ));
        }

        if self.tally.duplicate_event_adds != 0 {
            failures.push(format!(
                "{} events announced twice",
                self.tally.duplicate_event_adds
            ));
        }

        for f in failures {
            self.fail(f);
        }
    }

    /// Live queries seen by a recorder must match the enabled alerts, and
    /// each alert's match count its events.
    fn check_alerts(&mut self, log: &SharedLog) {
        let live = snapshot(log).live(InputKind::Query).len();
        let core = self.service.core();
        let enabled = core
            .alert_ids()
            .filter(|id| core.is_alert_enabled(*id) == Some(true))
            .count();

        let mut failures = Vec::new();
        if live != enabled {
            failures.push(format!(
                "{} live queries for {} enabled alerts",
                live, enabled
            ));
        }
        for id in core.alert_ids() {
            let matches = core.alert_matches(id).unwrap_or(0);
            let events = core
                .events()
                .filter(|(_, e)| e.sole_classifier() == Some(id))
                .count();
            if matches != events {
                failures.push(format!(
                    "alert {} counts {} matches for {} events",
                    id, matches, events
                ));
            }
        }
        for f in failures {
            self.fail(f);
        }
    }

    fn into_result(self) -> (ScenarioResult, Option<SimExport>) {
        let core = self.service.core();
        let mut metrics = self.metrics;
        metrics.core_turns = self.service.turns();
        metrics.events_admitted = self.tally.events_added.len();
        metrics.live_inputs = core.live_input_count();

        let passed = self.failures.is_empty();
        let failure_reason = (!passed).then(|| {
            let shown: Vec<&str> = self.failures.iter().take(3).map(String::as_str).collect();
            let more = self.failures.len().saturating_sub(shown.len());
            if more > 0 {
                format!("{} (+{} more)", shown.join("; "), more)
            } else {
                shown.join("; ")
            }
        });

        if passed {
            info!(
                "✓ {} complete: {} observations, {} tracks, RMS {:.3}px, deferred peak {}",
                self.scenario.name(),
                metrics.observations,
                core.tracks().count(),
                metrics.rms_error,
                metrics.deferred_peak
            );
        }

        let export = self.export.map(|mut export| {
            export.finalize(passed, failure_reason.clone(), Some(metrics.rms_error));
            export
        });

        let result = ScenarioResult {
            scenario: self.scenario,
            seed: self.seed,
            passed,
            total_frames: self.frames,
            final_time_secs: self.oracle.time(),
            final_track_count: core.tracks().count(),
            failure_reason,
            metrics,
        };
        (result, export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_passes(scenario: ScenarioId, seed: u64) {
        let result = ScenarioRunner::new(seed)
            .with_frames(120)
            .with_movers(6)
            .run(scenario);
        assert!(
            result.passed,
            "{} seed {} failed: {:?}",
            scenario,
            seed,
            result.failure_reason
        );
    }

    #[test]
    fn test_in_order() {
        assert_passes(ScenarioId::InOrder, 42);
    }

    #[test]
    fn test_homography_lag_defers_and_replays() {
        let result = ScenarioRunner::new(7).with_frames(120).run(ScenarioId::HomographyLag);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.deferred_peak > 0);
    }

    #[test]
    fn test_jitter() {
        assert_passes(ScenarioId::Jitter, 3);
    }

    #[test]
    fn test_late_joiner() {
        assert_passes(ScenarioId::LateJoiner, 11);
    }

    #[test]
    fn test_duplicate_events() {
        let result = ScenarioRunner::new(5).with_frames(90).run(ScenarioId::DuplicateEvents);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.events_admitted, 12);
        assert!(result.metrics.event_submissions > 24);
    }

    #[test]
    fn test_alert_churn() {
        let result = ScenarioRunner::new(9).with_frames(150).run(ScenarioId::AlertChurn);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.alert_operations > 0);
    }

    #[test]
    fn test_tripwire() {
        let result = ScenarioRunner::new(13).with_frames(150).run(ScenarioId::Tripwire);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.tripwire_events >= 2);
    }

    #[test]
    fn test_playback_through_spawned_service() {
        let result = ScenarioRunner::new(17).with_frames(90).run(ScenarioId::Playback);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.final_track_count > 0);
        assert_eq!(result.metrics.deferred_peak, 0);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let runner = ScenarioRunner::new(21).with_frames(60);
        let a = runner.run(ScenarioId::Jitter);
        let b = runner.run(ScenarioId::Jitter);
        assert_eq!(a.metrics.deferred_peak, b.metrics.deferred_peak);
        assert_eq!(a.metrics.core_turns, b.metrics.core_turns);
        assert_eq!(a.metrics.rms_error, b.metrics.rms_error);
    }

    #[test]
    fn test_export_has_every_frame() {
        let (result, export) = ScenarioRunner::new(1)
            .with_frames(45)
            .run_exported(ScenarioId::LateJoiner);
        assert!(result.passed);
        assert_eq!(export.frames.len(), 45);
        assert!(export.passed);
        assert!(export
            .frames
            .iter()
            .any(|f| f.events.iter().any(|e| e.message.contains("late recorder"))));
    }

    #[test]
    fn test_minimum_frames() {
        let result = ScenarioRunner::new(2).with_frames(1).run(ScenarioId::InOrder);
        assert_eq!(result.total_frames, 30);
    }
}
