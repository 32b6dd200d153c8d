//! JSON exporter for scenario runs.
//!
//! Writes per-frame snapshots of ground truth next to the core's
//! stabilized tracks, for offline plotting.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub frame: u64,

    /// Frame time in seconds
    pub time_sec: f64,

    /// Ground truth mover positions (stabilized)
    pub ground_truth: Vec<MoverPosition>,

    /// Core model tracks at this frame
    pub tracks: Vec<TrackPosition>,

    /// Admitted events
    pub event_count: usize,

    /// Track states still waiting for a homography
    pub deferred_states: usize,

    /// Notable things that happened during the frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Position of a mover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoverPosition {
    pub track: String,
    pub x: f64,
    pub y: f64,
}

impl MoverPosition {
    pub fn new(track: impl ToString, pos: Point2<f64>) -> Self {
        Self {
            track: track.to_string(),
            x: pos.x,
            y: pos.y,
        }
    }
}

/// Stabilized position of a model track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPosition {
    pub track: String,
    pub x: f64,
    pub y: f64,
    /// Distance to ground truth, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Final RMS error of stabilized positions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_rms_error: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            final_rms_error: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, rms_error: Option<f64>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.final_rms_error = rms_error;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
