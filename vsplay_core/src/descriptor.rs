//! Analytic descriptors retained for query formulation.

use crate::timestamp::TimeStamp;
use crate::track::TrackId;
use serde::{Deserialize, Serialize};

/// A descriptor computed by an analytic source over a span of video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub module: String,
    pub track: Option<TrackId>,
    /// Sample times, ascending
    pub region_times: Vec<TimeStamp>,
    pub values: Vec<f64>,
}

impl Descriptor {
    /// True if the descriptor's region overlaps the open interval `(start, end)`.
    pub fn overlaps(&self, start: TimeStamp, end: TimeStamp) -> bool {
        match (self.region_times.first(), self.region_times.last()) {
            (Some(first), Some(last)) => *first < end && start < *last,
            _ => false,
        }
    }
}
