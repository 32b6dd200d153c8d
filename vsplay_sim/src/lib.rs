//! vsPlay Deterministic Reconciliation Harness
//!
//! Runs the vsPlay core against a synthetic video whose ground truth is
//! known, under delivery orders a live system produces: homographies
//! lagging behind tracks, jittered and shuffled hand-offs, descriptors
//! attaching mid-stream, duplicated event reports and analyst churn.
//!
//! # Core Principle: One Seed
//!
//! All sources of non-determinism are derived from a single 64-bit seed:
//! - **Time**: a virtual clock advanced one frame interval per step
//! - **Scene**: movers, camera motion and sensor noise from a physics seed
//! - **Delivery**: per-message delays and turn shuffles from the context RNG
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  metadata / states / closes  ┌────────────────────┐
//! │    Oracle    │ ───────── delayed ─────────► │    CoreService     │
//! │ (scene truth)│                              │  ┌──────────────┐  │
//! └──────┬───────┘                              │  │     Core     │  │
//!        │ truth                                │  └──────┬───────┘  │
//!        ▼                                      └─────────┼──────────┘
//! ┌──────────────┐        notifications / model         │ inputs
//! │    Checks    │ ◄────────────────────────────────────┤
//! └──────────────┘                              ┌─────────▼──────────┐
//!                                               │ Recorder / Echo /  │
//!                                               │  QueryResponder    │
//!                                               └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vsplay_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_frames(300).run(ScenarioId::Jitter);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod recorder;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{MoverPosition, SimEvent, SimExport, SimFrame, TrackPosition};
pub use oracle::{CameraPath, GroundTruthMover, Observation, Oracle, SceneFrame};
pub use recorder::{snapshot, EchoSource, QueryResponder, RecordLog, RecordingSource, SharedLog};
pub use runner::{stabilization_error, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
