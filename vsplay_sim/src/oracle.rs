//! Ground truth oracle for simulation.
//!
//! The Oracle owns the "God's eye view" of a synthetic video:
//! - True stabilized positions of every mover
//! - A moving camera (pan, slow rotation and zoom) giving each frame its
//!   image -> stabilized homography
//! - Noisy image-space track observations and events referencing tracks

use nalgebra::{Matrix3, Point2, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vsplay_core::metadata::FrameMetadata;
use vsplay_core::track::TrackState;
use vsplay_core::{Event, EventTypeId, Homography, TimeStamp, TrackId};

/// Track source id used for every synthetic track.
pub const SIM_TRACK_SOURCE: i32 = 1;

/// Classifier type given to synthetic events.
pub const SIM_EVENT_TYPE: EventTypeId = 7;

/// Timeline offset of frame 0.
const FIRST_FRAME_US: i64 = 1_000_000;

/// A mover in the synthetic scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthMover {
    pub track: TrackId,

    /// Stabilized position at `first_frame`
    pub origin: Vector2<f64>,

    /// Stabilized velocity in pixels per second
    pub velocity: Vector2<f64>,

    /// First frame the mover is visible in
    pub first_frame: u64,

    /// Last frame the mover is visible in (inclusive)
    pub last_frame: u64,
}

impl GroundTruthMover {
    pub fn is_visible(&self, frame: u64) -> bool {
        (self.first_frame..=self.last_frame).contains(&frame)
    }
}

/// Camera motion over the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraPath {
    /// Stabilized-space pan, pixels per second
    pub pan: Vector2<f64>,
    /// Radians per second
    pub rotation_rate: f64,
    /// Relative scale change per second
    pub zoom_rate: f64,
}

impl Default for CameraPath {
    fn default() -> Self {
        Self {
            pan: Vector2::new(12.0, -4.0),
            rotation_rate: 0.01,
            zoom_rate: 0.005,
        }
    }
}

/// One image-space observation of a mover.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub track: TrackId,
    pub state: TrackState,
}

/// Everything the scene produces for one frame.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    pub index: u64,
    pub time: TimeStamp,
    pub metadata: FrameMetadata,
    pub observations: Vec<Observation>,
    /// Tracks whose last observation is in this frame
    pub ended: Vec<TrackId>,
}

/// The Oracle - maintains ground truth and generates observations.
pub struct Oracle {
    /// Seed of the scene (separate from delivery so that changing delivery
    /// order does not change the scene)
    physics_seed: u64,

    /// RNG for placement and noise
    physics_rng: ChaCha8Rng,

    movers: BTreeMap<TrackId, GroundTruthMover>,

    /// True stabilized position of every observation made so far
    truth: BTreeMap<TrackId, BTreeMap<TimeStamp, Point2<f64>>>,

    next_serial: i64,

    /// Next frame to produce
    frame: u64,

    frame_interval_us: i64,

    camera: CameraPath,

    /// Image-space noise standard deviation (pixels)
    position_noise_std: f64,
}

impl Oracle {
    /// Creates an Oracle at 30 frames per second with 0.25 px noise.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            movers: BTreeMap::new(),
            truth: BTreeMap::new(),
            next_serial: 1,
            frame: 0,
            frame_interval_us: 33_333,
            camera: CameraPath::default(),
            position_noise_std: 0.25,
        }
    }

    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    /// Sets the position noise standard deviation.
    pub fn set_position_noise(&mut self, std_dev: f64) {
        self.position_noise_std = std_dev.max(0.0);
    }

    pub fn position_noise(&self) -> f64 {
        self.position_noise_std
    }

    pub fn set_camera(&mut self, camera: CameraPath) {
        self.camera = camera;
    }

    pub fn set_frame_rate(&mut self, hz: u32) {
        self.frame_interval_us = 1_000_000 / i64::from(hz.max(1));
    }

    // ========================================================================
    // SCENE SETUP
    // ========================================================================

    /// Adds a mover and returns its track id.
    pub fn spawn_mover(
        &mut self,
        origin: Vector2<f64>,
        velocity: Vector2<f64>,
        first_frame: u64,
        last_frame: u64,
    ) -> TrackId {
        let track = TrackId::new(SIM_TRACK_SOURCE, self.next_serial);
        self.next_serial += 1;
        self.movers.insert(
            track,
            GroundTruthMover {
                track,
                origin,
                velocity,
                first_frame,
                last_frame: last_frame.max(first_frame),
            },
        );
        track
    }

    /// Adds `count` movers with random placement, heading and lifetime
    /// within a run of `frames` frames.
    ///
    /// Every mover appears in the first third of the run and is visible for
    /// at least two frames.
    pub fn spawn_random_movers(&mut self, count: usize, frames: u64) -> Vec<TrackId> {
        let frames = frames.max(2);
        (0..count)
            .map(|_| {
                let origin = Vector2::new(
                    self.physics_rng.gen_range(0.0..1000.0),
                    self.physics_rng.gen_range(0.0..1000.0),
                );
                let heading = self.physics_rng.gen_range(0.0..std::f64::consts::TAU);
                let speed = self.physics_rng.gen_range(20.0..80.0);
                let velocity = Vector2::new(heading.cos(), heading.sin()) * speed;

                let first = self.physics_rng.gen_range(0..(frames / 3).max(1));
                let min_last = (first + 1).max(frames * 2 / 3).min(frames - 1);
                let last = self.physics_rng.gen_range(min_last..frames);
                self.spawn_mover(origin, velocity, first, last)
            })
            .collect()
    }

    // ========================================================================
    // TIMELINE
    // ========================================================================

    pub fn frame_time(&self, index: u64) -> TimeStamp {
        TimeStamp::from_micros(FIRST_FRAME_US + index as i64 * self.frame_interval_us)
    }

    pub fn frame_interval_us(&self) -> i64 {
        self.frame_interval_us
    }

    /// Image -> stabilized transform of a frame.
    pub fn camera_homography(&self, index: u64) -> Homography {
        let t = index as f64 * self.frame_interval_us as f64 * 1e-6;
        let theta = self.camera.rotation_rate * t;
        let scale = 1.0 + self.camera.zoom_rate * t;
        let (sin, cos) = theta.sin_cos();
        let pan = self.camera.pan * t;
        Homography(Matrix3::new(
            scale * cos,
            -scale * sin,
            pan.x,
            scale * sin,
            scale * cos,
            pan.y,
            0.0,
            0.0,
            1.0,
        ))
    }

    /// True stabilized position of a mover in a frame.
    pub fn position_at(&self, track: TrackId, index: u64) -> Option<Point2<f64>> {
        let mover = self.movers.get(&track)?;
        if !mover.is_visible(index) {
            return None;
        }
        let elapsed = (index - mover.first_frame) as f64 * self.frame_interval_us as f64 * 1e-6;
        Some(Point2::from(mover.origin + mover.velocity * elapsed))
    }

    /// Produces the next frame and advances the scene.
    pub fn step(&mut self) -> SceneFrame {
        let index = self.frame;
        self.frame += 1;

        let time = self.frame_time(index);
        let homography = self.camera_homography(index);
        let to_image = homography.inverse().unwrap_or_else(Homography::identity);
        let noise = Normal::new(0.0, self.position_noise_std).ok();

        let visible: Vec<(TrackId, Point2<f64>)> = self
            .movers
            .keys()
            .filter_map(|track| self.position_at(*track, index).map(|p| (*track, p)))
            .collect();

        let mut observations = Vec::with_capacity(visible.len());
        for (track, stabilized) in visible {
            self.truth.entry(track).or_default().insert(time, stabilized);

            let mut image = to_image.apply(&stabilized);
            if let Some(noise) = &noise {
                image.x += noise.sample(&mut self.physics_rng);
                image.y += noise.sample(&mut self.physics_rng);
            }
            observations.push(Observation {
                track,
                state: TrackState::new(time, image.x, image.y),
            });
        }

        let ended = self
            .movers
            .values()
            .filter(|m| m.last_frame == index)
            .map(|m| m.track)
            .collect();

        let mut metadata = FrameMetadata::with_homography(time, homography);
        metadata.gsd = Some(0.5);

        SceneFrame {
            index,
            time,
            metadata,
            observations,
            ended,
        }
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    /// An event on `track` covering its whole lifetime, with one image-space
    /// region at the first frame.
    pub fn track_event(&self, track: TrackId, local_id: i64) -> Option<Event> {
        let mover = self.movers.get(&track)?;
        let start = self.frame_time(mover.first_frame);
        let end = self.frame_time(mover.last_frame);
        let stabilized = self.position_at(track, mover.first_frame)?;
        let to_image = self
            .camera_homography(mover.first_frame)
            .inverse()
            .unwrap_or_else(Homography::identity);
        let c = to_image.apply(&stabilized);
        let region = vec![
            Point2::new(c.x - 5.0, c.y - 5.0),
            Point2::new(c.x + 5.0, c.y - 5.0),
            Point2::new(c.x + 5.0, c.y + 5.0),
            Point2::new(c.x - 5.0, c.y + 5.0),
        ];

        Some(
            Event::new(local_id)
                .with_classifier(SIM_EVENT_TYPE, 0.9)
                .with_track(track, start, end)
                .with_span(start, end)
                .with_region(start, region),
        )
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Next frame index.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Current scene time in seconds.
    pub fn time(&self) -> f64 {
        self.frame as f64 * self.frame_interval_us as f64 * 1e-6
    }

    pub fn movers(&self) -> impl Iterator<Item = &GroundTruthMover> {
        self.movers.values()
    }

    pub fn mover(&self, track: TrackId) -> Option<&GroundTruthMover> {
        self.movers.get(&track)
    }

    /// Movers visible in the most recently produced frame.
    pub fn active_movers(&self) -> Vec<&GroundTruthMover> {
        match self.frame.checked_sub(1) {
            Some(last) => self.movers.values().filter(|m| m.is_visible(last)).collect(),
            None => Vec::new(),
        }
    }

    /// True stabilized position recorded for an observation.
    pub fn truth_at(&self, track: TrackId, time: TimeStamp) -> Option<Point2<f64>> {
        self.truth.get(&track)?.get(&time).copied()
    }

    /// Number of observations made so far.
    pub fn observation_count(&self) -> usize {
        self.truth.values().map(BTreeMap::len).sum()
    }
}
