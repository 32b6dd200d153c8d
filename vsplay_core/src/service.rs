//! Core Service - single-owner dispatch loop around [`Core`].
//!
//! Background sources never touch the engine. They post [`CoreMessage`]s
//! through a [`CoreHandle`]; the service applies every message already
//! queued and then runs the end-of-turn flush once.
//!
//! ```text
//! ┌──────────────┐   post()   ┌──────────────────────────────────────┐
//! │ track source │──────────▶│             CoreService               │
//! ├──────────────┤            │  recv ─▶ drain ready ─▶ apply each   │
//! │ video source │──────────▶│                 │                     │
//! ├──────────────┤            │                 ▼                     │
//! │  UI / tools  │──────────▶│        Core::flush_pending()          │
//! └──────────────┘            └──────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vsplay_core::{Core, CoreService};
//! use vsplay_env::TokioContext;
//!
//! let (service, handle) = CoreService::new(TokioContext::shared(), Core::with_defaults());
//! let finished = service.spawn();
//! handle.ingest_homography(ts, h)?;
//! handle.shutdown()?;
//! let core = finished.await?;
//! ```

use crate::engine::Core;
use crate::event::{Event, EventOrigin};
use crate::event_types::{EventGroup, EventInfo};
use crate::homography::Homography;
use crate::metadata::FrameMetadata;
use crate::notification::SourceKind;
use crate::timestamp::TimeStamp;
use crate::track::{TrackClassification, TrackId, TrackState};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vsplay_env::{mailbox, DataSourceStatus, EnvError, MailboxReceiver, MailboxSender, SourceId, VsContext};

/// Arbitrary work to run against the core on the dispatch task.
pub type CoreJob = Box<dyn FnOnce(&mut Core) + Send>;

/// One hand-off into the dispatch task.
pub enum CoreMessage {
    Metadata(Vec<FrameMetadata>),
    UpdateTrack {
        track: TrackId,
        states: Vec<TrackState>,
    },
    TrackData {
        track: TrackId,
        data: BTreeMap<String, Vec<(TimeStamp, f64)>>,
    },
    CloseTrack(TrackId),
    TrackClassification {
        track: TrackId,
        classification: TrackClassification,
    },
    AddEvent {
        origin: EventOrigin,
        event: Event,
    },
    RemoveEvent {
        origin: EventOrigin,
        source_local_id: i64,
    },
    EventType {
        origin: EventOrigin,
        info: EventInfo,
        threshold: f64,
    },
    ExpectGroup(EventGroup),
    /// A descriptor source is ready to receive input
    SourceReady(SourceId),
    SourceStatus {
        kind: SourceKind,
        status: DataSourceStatus,
    },
    Invoke(CoreJob),
    Shutdown,
}

impl fmt::Debug for CoreMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoreMessage::Metadata(_) => "Metadata",
            CoreMessage::UpdateTrack { .. } => "UpdateTrack",
            CoreMessage::TrackData { .. } => "TrackData",
            CoreMessage::CloseTrack(_) => "CloseTrack",
            CoreMessage::TrackClassification { .. } => "TrackClassification",
            CoreMessage::AddEvent { .. } => "AddEvent",
            CoreMessage::RemoveEvent { .. } => "RemoveEvent",
            CoreMessage::EventType { .. } => "EventType",
            CoreMessage::ExpectGroup(_) => "ExpectGroup",
            CoreMessage::SourceReady(_) => "SourceReady",
            CoreMessage::SourceStatus { .. } => "SourceStatus",
            CoreMessage::Invoke(_) => "Invoke",
            CoreMessage::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Clonable, thread-safe hand-off to a running [`CoreService`].
#[derive(Debug, Clone)]
pub struct CoreHandle {
    tx: MailboxSender<CoreMessage>,
}

impl CoreHandle {
    pub fn post(&self, msg: CoreMessage) -> Result<(), EnvError> {
        self.tx.post(msg)
    }

    pub fn add_metadata(&self, metadata: Vec<FrameMetadata>) -> Result<(), EnvError> {
        self.post(CoreMessage::Metadata(metadata))
    }

    pub fn ingest_homography(&self, time: TimeStamp, homography: Homography) -> Result<(), EnvError> {
        self.add_metadata(vec![FrameMetadata::with_homography(time, homography)])
    }

    pub fn update_track(&self, track: TrackId, states: Vec<TrackState>) -> Result<(), EnvError> {
        self.post(CoreMessage::UpdateTrack { track, states })
    }

    pub fn close_track(&self, track: TrackId) -> Result<(), EnvError> {
        self.post(CoreMessage::CloseTrack(track))
    }

    pub fn add_event(&self, origin: EventOrigin, event: Event) -> Result<(), EnvError> {
        self.post(CoreMessage::AddEvent { origin, event })
    }

    pub fn remove_event(&self, origin: EventOrigin, source_local_id: i64) -> Result<(), EnvError> {
        self.post(CoreMessage::RemoveEvent {
            origin,
            source_local_id,
        })
    }

    /// Runs `job` on the dispatch task.
    pub fn invoke<F>(&self, job: F) -> Result<(), EnvError>
    where
        F: FnOnce(&mut Core) + Send + 'static,
    {
        self.post(CoreMessage::Invoke(Box::new(job)))
    }

    pub fn shutdown(&self) -> Result<(), EnvError> {
        self.post(CoreMessage::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owns the [`Core`] and applies posted messages in arrival order.
///
/// Generic over the context so the same loop runs in production (tokio)
/// and in the simulation harness.
pub struct CoreService<Ctx: VsContext> {
    context: Arc<Ctx>,
    core: Core,
    rx: MailboxReceiver<CoreMessage>,
    turns: u64,
}

impl<Ctx: VsContext> CoreService<Ctx> {
    pub fn new(context: Arc<Ctx>, core: Core) -> (Self, CoreHandle) {
        let (tx, rx) = mailbox();
        (
            Self {
                context,
                core,
                rx,
                turns: 0,
            },
            CoreHandle { tx },
        )
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    /// Number of completed processing turns.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Runs until `Shutdown` is received or every handle is dropped, then
    /// returns the core.
    pub async fn run(mut self) -> Core {
        info!(
            "Core service started (seed {}, t={:?})",
            self.context.seed(),
            self.context.now()
        );
        while let Some(first) = self.rx.recv().await {
            if !self.run_turn(first) {
                break;
            }
        }
        info!("Core service stopped after {} turns", self.turns);
        self.core
    }

    /// Runs the service as a `core-service` task on its context. The
    /// receiver yields the core once the loop stops.
    pub fn spawn(self) -> oneshot::Receiver<Core> {
        let (tx, rx) = oneshot::channel();
        let context = Arc::clone(&self.context);
        context.spawn("core-service", async move {
            let core = self.run().await;
            let _ = tx.send(core);
        });
        rx
    }

    /// Applies everything already queued without waiting. Returns false if
    /// a `Shutdown` was seen.
    pub fn process_ready(&mut self) -> bool {
        match self.rx.try_recv() {
            Some(first) => self.run_turn(first),
            None => true,
        }
    }

    fn run_turn(&mut self, first: CoreMessage) -> bool {
        let mut batch = vec![first];
        batch.extend(self.rx.drain_ready());
        debug!("Turn {}: {} messages", self.turns + 1, batch.len());

        let mut running = true;
        for msg in batch {
            if !running {
                warn!("Dropping {:?} received after shutdown", msg);
                continue;
            }
            running = self.apply(msg);
        }

        self.core.flush_pending();
        self.turns += 1;
        running
    }

    fn apply(&mut self, msg: CoreMessage) -> bool {
        match msg {
            CoreMessage::Metadata(metadata) => self.core.add_metadata(metadata),
            CoreMessage::UpdateTrack { track, states } => self.core.update_track(track, states),
            CoreMessage::TrackData { track, data } => self.core.update_track_data(track, data),
            CoreMessage::CloseTrack(track) => self.core.close_track(track),
            CoreMessage::TrackClassification {
                track,
                classification,
            } => self.core.set_track_classification(track, classification),
            CoreMessage::AddEvent { origin, event } => self.core.add_event(origin, event),
            CoreMessage::RemoveEvent {
                origin,
                source_local_id,
            } => {
                self.core.remove_event(origin, source_local_id);
            }
            CoreMessage::EventType {
                origin,
                info,
                threshold,
            } => {
                self.core.add_event_type(origin, info, threshold);
            }
            CoreMessage::ExpectGroup(group) => self.core.expect_event_group(group),
            CoreMessage::SourceReady(id) => {
                if let Err(e) = self.core.connect_descriptor_inputs(id) {
                    warn!("Ignoring ready signal: {}", e);
                }
            }
            CoreMessage::SourceStatus { kind, status } => {
                self.core.update_source_status(kind, status)
            }
            CoreMessage::Invoke(job) => job(&mut self.core),
            CoreMessage::Shutdown => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::CoreNotification;
    use vsplay_env::TokioContext;

    fn ts(us: i64) -> TimeStamp {
        TimeStamp::from_micros(us)
    }

    #[tokio::test]
    async fn test_burst_is_one_turn() {
        let mut core = Core::with_defaults();
        let mut rx = core.subscribe();
        let (service, handle) = CoreService::new(TokioContext::shared(), core);

        let track = TrackId::new(1, 7);
        handle.ingest_homography(ts(1000), Homography::identity()).unwrap();
        handle
            .update_track(track, vec![TrackState::new(ts(1500), 0.0, 0.0)])
            .unwrap();
        handle
            .add_metadata(vec![
                FrameMetadata::with_homography(ts(1500), Homography::identity()),
                FrameMetadata::with_homography(ts(1600), Homography::identity()),
            ])
            .unwrap();
        handle
            .update_track(track, vec![TrackState::new(ts(1600), 1.0, 0.0)])
            .unwrap();
        handle.shutdown().unwrap();

        let core = service.run().await;
        let id = core.model_track_id(track).unwrap();
        assert_eq!(core.track(id).unwrap().states.len(), 2);

        let mut signals = Vec::new();
        while let Ok(n) = rx.try_recv() {
            if matches!(n, CoreNotification::TrackAdded(_) | CoreNotification::TrackChanged(_)) {
                signals.push(n);
            }
        }
        assert_eq!(signals, vec![CoreNotification::TrackAdded(id)]);
    }

    #[tokio::test]
    async fn test_handle_from_another_task() {
        let (service, handle) = CoreService::new(TokioContext::shared(), Core::with_defaults());
        let runner = tokio::spawn(service.run());

        let producer = handle.clone();
        tokio::spawn(async move {
            producer
                .add_event(EventOrigin::Raw, Event::new(1).with_span(ts(0), ts(5)))
                .unwrap();
        })
        .await
        .unwrap();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        handle
            .invoke(move |core| {
                let _ = done_tx.send(core.event_count());
            })
            .unwrap();
        assert_eq!(done_rx.await.unwrap(), 1);

        handle.shutdown().unwrap();
        let core = runner.await.unwrap();
        assert_eq!(core.event_count(), 1);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_spawned_service_hands_back_core() {
        let (service, handle) = CoreService::new(TokioContext::shared(), Core::with_defaults());
        let finished = service.spawn();
        handle.ingest_homography(ts(0), Homography::identity()).unwrap();
        handle
            .update_track(TrackId::new(2, 2), vec![TrackState::new(ts(0), 0.0, 0.0)])
            .unwrap();
        handle.shutdown().unwrap();

        let core = finished.await.unwrap();
        assert!(core.model_track_id(TrackId::new(2, 2)).is_some());
        assert!(handle.is_closed());
    }

    #[test]
    fn test_process_ready_without_runtime_loop() {
        let (mut service, handle) = CoreService::new(TokioContext::shared(), Core::with_defaults());
        handle
            .post(CoreMessage::ExpectGroup(EventGroup::User))
            .unwrap();
        assert!(service.process_ready());
        assert_eq!(service.turns(), 1);
        assert!(service.core().expected_event_groups().contains(&EventGroup::User));

        handle.shutdown().unwrap();
        assert!(!service.process_ready());
    }
}
