//! Core environment context trait for the vsPlay engine.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the vsPlay core service
/// can run both in production (tokio) and inside the deterministic
/// simulation harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// For simulation runs, every method that would normally introduce
/// non-determinism (time, task scheduling) is controlled by the
/// implementation.
#[async_trait]
pub trait VsContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// Archived feeds pace their playback with this. In production it wraps
    /// `tokio::time::sleep`; in simulation it advances the virtual clock and
    /// yields so the dispatch task can take a turn.
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task (core service, feed playback).
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
