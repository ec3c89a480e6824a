use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Metres per degree of latitude at the equator.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

//--------------------------------------    Coordinates   ------------------------------------------------------------
/// A WGS84 point. Stored in the database as a pair of REAL columns rather than a geometry type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Converts a radius in metres into degrees using the flat equatorial approximation.
    ///
    /// This understates the longitudinal radius away from the equator. It is good enough for a
    /// dispatch preference radius; do not use it for billing-grade distance calculations.
    pub fn meters_to_degrees(meters: f64) -> f64 {
        meters / METERS_PER_DEGREE
    }

    /// Squared planar distance in degrees. Monotonic with true planar distance, so it is sufficient for
    /// nearest-first ordering without paying for a square root.
    pub fn distance_squared_degrees(&self, other: &Coordinates) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlng = self.longitude - other.longitude;
        dlat * dlat + dlng * dlng
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}
