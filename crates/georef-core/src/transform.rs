//! Pixel <-> lat/lon mapping for a scanned plate image.
//!
//! A plate is georeferenced from exactly two fixes whose pixel positions the
//! decoder reported. The mapping is a similarity transform with the x scale
//! compressed by cos(reference latitude), which approximates a conformal
//! projection well enough over the few miles a plate covers.

use crate::geo;
use crate::GeorefError;
use serde::{Deserialize, Serialize};

/// One fix's geodetic position together with where it was found on the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixPoint {
    pub lat: f64,
    pub lon: f64,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

/// Georeference coefficients for one plate image.
///
/// Stored and exchanged as a six-element array; the last two slots are
/// reserved and always zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Transform {
    /// Pixels per degree of longitude.
    pub pix_per_deg_lon: f64,
    /// Pixels per degree of latitude. Negative: pixel y grows downward
    /// while latitude grows northward.
    pub pix_per_deg_lat: f64,
    /// Longitude of the image's top-left corner.
    pub top_left_lon: f64,
    /// Latitude of the image's top-left corner.
    pub top_left_lat: f64,
}

impl From<[f64; 6]> for Transform {
    fn from(v: [f64; 6]) -> Self {
        Transform {
            pix_per_deg_lon: v[0],
            pix_per_deg_lat: v[1],
            top_left_lon: v[2],
            top_left_lat: v[3],
        }
    }
}

impl From<Transform> for [f64; 6] {
    fn from(t: Transform) -> Self {
        [
            t.pix_per_deg_lon,
            t.pix_per_deg_lat,
            t.top_left_lon,
            t.top_left_lat,
            0.0,
            0.0,
        ]
    }
}

impl Transform {
    /// Derive the transform from two reference fixes.
    ///
    /// `reference_lat` is the airport latitude, used only to scale the
    /// longitude axis. Each fix independently predicts the top-left corner
    /// and the two predictions are averaged, so the result does not depend
    /// on the order of the fixes.
    pub fn compute(
        reference_lat: f64,
        fix1: &FixPoint,
        fix2: &FixPoint,
    ) -> Result<Transform, GeorefError> {
        let pixel_dist = (fix2.pixel_x - fix1.pixel_x).hypot(fix2.pixel_y - fix1.pixel_y);
        let angular = geo::great_circle_rad(fix1.lat, fix1.lon, fix2.lat, fix2.lon);
        if pixel_dist == 0.0 || angular == 0.0 {
            return Err(GeorefError::DegenerateFixPair);
        }

        let pix_per_deg_lat = -0.5 * pixel_dist / angular.to_degrees();
        let pix_per_deg_lon = pix_per_deg_lat * reference_lat.to_radians().cos();
        if pix_per_deg_lon == 0.0 {
            // reference latitude at a pole collapses the longitude axis
            return Err(GeorefError::DegenerateFixPair);
        }

        let top_left_lon = (fix1.lon - fix1.pixel_x / pix_per_deg_lon / 2.0 + fix2.lon
            - fix2.pixel_x / pix_per_deg_lon / 2.0)
            / 2.0;
        let top_left_lat = (fix1.lat - fix1.pixel_y / pix_per_deg_lat / 2.0 + fix2.lat
            - fix2.pixel_y / pix_per_deg_lat / 2.0)
            / 2.0;

        Ok(Transform {
            pix_per_deg_lon,
            pix_per_deg_lat,
            top_left_lon,
            top_left_lat,
        })
    }

    pub fn latlon_to_pixel(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            (lon - self.top_left_lon) * self.pix_per_deg_lon,
            (lat - self.top_left_lat) * self.pix_per_deg_lat,
        )
    }

    pub fn pixel_to_latlon(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        (
            pixel_y / self.pix_per_deg_lat + self.top_left_lat,
            pixel_x / self.pix_per_deg_lon + self.top_left_lon,
        )
    }
}
