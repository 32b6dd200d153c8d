//! Paced playback of archived feeds.
//!
//! An archived track or metadata file is replayed into the core at media
//! rate: each message is posted once its media time, measured from the
//! first message, has elapsed on the context clock. The feed reports
//! `ArchivedActive` while it plays and `ArchivedIdle` when it runs out.

use crate::notification::SourceKind;
use crate::service::{CoreHandle, CoreMessage};
use crate::timestamp::TimeStamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vsplay_env::{DataSourceStatus, EnvError, VsContext};

/// A recorded stream of core messages keyed by media time.
pub struct ArchivedFeed {
    name: String,
    kind: SourceKind,
    items: Vec<(TimeStamp, CoreMessage)>,
    rate: f64,
}

impl ArchivedFeed {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            items: Vec::new(),
            rate: 1.0,
        }
    }

    /// Playback speed relative to media time; 2.0 plays twice as fast.
    /// Non-positive or non-finite rates fall back to 1.0.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        self
    }

    pub fn push(&mut self, at: TimeStamp, message: CoreMessage) {
        self.items.push((at, message));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Wall time the whole feed takes to play at the configured rate.
    pub fn duration(&self) -> Duration {
        let first = self.items.iter().map(|(at, _)| *at).min();
        let last = self.items.iter().map(|(at, _)| *at).max();
        match (first, last) {
            (Some(first), Some(last)) => offset(first, last, self.rate),
            _ => Duration::ZERO,
        }
    }

    /// Plays the feed into `handle`, returning how many messages were
    /// posted. Messages sharing a media time keep their push order.
    pub async fn play<Ctx: VsContext>(
        mut self,
        ctx: &Ctx,
        handle: &CoreHandle,
    ) -> Result<usize, EnvError> {
        self.items.sort_by_key(|(at, _)| *at);
        let Some(first) = self.items.first().map(|(at, _)| *at) else {
            return Ok(0);
        };
        info!(
            "Playing {} messages from '{}' at {}x",
            self.items.len(),
            self.name,
            self.rate
        );

        handle.post(CoreMessage::SourceStatus {
            kind: self.kind,
            status: DataSourceStatus::ArchivedActive,
        })?;

        let started = ctx.now();
        let mut posted = 0;
        for (at, message) in self.items {
            let due = offset(first, at, self.rate);
            let elapsed = ctx.now().saturating_sub(started);
            if due > elapsed {
                ctx.sleep(due - elapsed).await;
            }
            handle.post(message)?;
            posted += 1;
        }

        handle.post(CoreMessage::SourceStatus {
            kind: self.kind,
            status: DataSourceStatus::ArchivedIdle,
        })?;
        debug!("Feed '{}' finished after {} messages", self.name, posted);
        Ok(posted)
    }

    /// Plays the feed on a background task of `ctx`.
    pub fn spawn<Ctx: VsContext>(
        self,
        ctx: Arc<Ctx>,
        handle: CoreHandle,
    ) -> oneshot::Receiver<Result<usize, EnvError>> {
        let (tx, rx) = oneshot::channel();
        let name = format!("feed:{}", self.name);
        let task_ctx = Arc::clone(&ctx);
        let label = self.name.clone();
        ctx.spawn(&name, async move {
            let result = self.play(task_ctx.as_ref(), &handle).await;
            if let Err(e) = &result {
                warn!("Feed '{}' stopped early: {}", label, e);
            }
            let _ = tx.send(result);
        });
        rx
    }
}

fn offset(first: TimeStamp, at: TimeStamp, rate: f64) -> Duration {
    let us = at.as_micros().saturating_sub(first.as_micros()).max(0);
    Duration::from_micros((us as f64 / rate) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Core;
    use crate::homography::Homography;
    use crate::metadata::FrameMetadata;
    use crate::notification::CoreNotification;
    use crate::service::CoreService;
    use crate::track::{TrackId, TrackState};
    use vsplay_env::TokioContext;

    fn ts(us: i64) -> TimeStamp {
        TimeStamp::from_micros(us)
    }

    fn frame(us: i64) -> CoreMessage {
        CoreMessage::Metadata(vec![FrameMetadata::with_homography(
            ts(us),
            Homography::identity(),
        )])
    }

    #[test]
    fn test_duration_scales_with_rate() {
        let mut feed = ArchivedFeed::new("clip", SourceKind::Track);
        assert_eq!(feed.duration(), Duration::ZERO);
        feed.push(ts(4_000), frame(4_000));
        feed.push(ts(0), frame(0));
        assert_eq!(feed.duration(), Duration::from_millis(4));

        let fast = feed.with_rate(2.0);
        assert_eq!(fast.duration(), Duration::from_millis(2));
        assert_eq!(fast.with_rate(-1.0).duration(), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_play_posts_in_media_order() {
        let ctx = TokioContext::shared();
        let mut core = Core::with_defaults();
        let mut rx = core.subscribe();
        let (service, handle) = CoreService::new(Arc::clone(&ctx), core);

        let track = TrackId::new(1, 1);
        let mut feed = ArchivedFeed::new("tracks", SourceKind::Track);
        // Out of order on purpose: the state must wait for its frame
        feed.push(
            ts(2_000),
            CoreMessage::UpdateTrack {
                track,
                states: vec![TrackState::new(ts(2_000), 1.0, 1.0)],
            },
        );
        feed.push(ts(0), frame(0));
        feed.push(ts(2_000), frame(2_000));

        let started = ctx.now();
        let posted = feed.play(ctx.as_ref(), &handle).await.unwrap();
        assert_eq!(posted, 3);
        assert!(ctx.now() - started >= Duration::from_millis(2));

        handle.shutdown().unwrap();
        let core = service.run().await;
        let id = core.model_track_id(track).unwrap();
        assert_eq!(core.track(id).unwrap().states.len(), 1);
        assert_eq!(
            core.source_status(SourceKind::Track),
            DataSourceStatus::ArchivedIdle
        );

        let mut saw_active = false;
        while let Ok(n) = rx.try_recv() {
            if n == (CoreNotification::SourceStatusChanged {
                kind: SourceKind::Track,
                status: DataSourceStatus::ArchivedActive,
            }) {
                saw_active = true;
            }
        }
        assert!(saw_active);
    }

    #[tokio::test]
    async fn test_spawned_feed_and_service() {
        let ctx = TokioContext::shared();
        let (service, handle) = CoreService::new(Arc::clone(&ctx), Core::with_defaults());
        let finished = service.spawn();

        let mut feed = ArchivedFeed::new("video", SourceKind::Video).with_rate(4.0);
        for i in 0..5 {
            feed.push(ts(i * 1_000), frame(i * 1_000));
        }
        let played = feed.spawn(Arc::clone(&ctx), handle.clone());
        assert_eq!(played.await.unwrap().unwrap(), 5);

        handle.shutdown().unwrap();
        let core = finished.await.unwrap();
        assert_eq!(core.homography_watermark(), Some(ts(4_000)));
        assert_eq!(
            core.source_status(SourceKind::Video),
            DataSourceStatus::ArchivedIdle
        );
    }

    #[tokio::test]
    async fn test_play_into_closed_service_fails() {
        let ctx = TokioContext::shared();
        let (service, handle) = CoreService::new(Arc::clone(&ctx), Core::with_defaults());
        drop(service);

        let mut feed = ArchivedFeed::new("orphan", SourceKind::Track);
        feed.push(ts(0), frame(0));
        assert!(feed.play(ctx.as_ref(), &handle).await.is_err());

        let empty = ArchivedFeed::new("empty", SourceKind::Track);
        assert_eq!(empty.play(ctx.as_ref(), &handle).await.unwrap(), 0);
    }
}
