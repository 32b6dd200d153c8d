//! Per-frame video metadata.

use crate::homography::Homography;
use crate::timestamp::TimeStamp;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Geodetic coordinate produced by image/stabilized-to-world mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Metadata announced for one video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Frame time
    pub time: TimeStamp,

    /// Image -> stabilized transform for this frame
    pub homography: Homography,

    /// Frame number the stabilized space of `homography` is anchored to
    pub homography_reference_frame: u32,

    /// Ground sample distance (meters/pixel), when known
    pub gsd: Option<f64>,

    /// Image -> (longitude, latitude) transform, when the frame is geolocated
    pub image_to_world: Option<Homography>,
}

impl FrameMetadata {
    /// Metadata carrying only a homography.
    pub fn with_homography(time: TimeStamp, homography: Homography) -> Self {
        Self {
            time,
            homography,
            homography_reference_frame: 0,
            gsd: None,
            image_to_world: None,
        }
    }

    /// Maps an image point to world coordinates, if the frame is geolocated.
    pub fn image_to_world(&self, image: &Point2<f64>) -> Option<GeoCoordinate> {
        let m = self.image_to_world.as_ref()?;
        let w = m.apply(image);
        Some(GeoCoordinate {
            longitude: w.x,
            latitude: w.y,
        })
    }

    /// Maps a stabilized point back through the frame homography, then to world.
    pub fn stab_to_world(&self, stab: &Point2<f64>) -> Option<GeoCoordinate> {
        self.image_to_world.as_ref()?;
        let inv = self.homography.inverse()?;
        self.image_to_world(&inv.apply(stab))
    }
}
