//! # Geodesy Primitives
//!
//! Coordinate type and great-circle math shared by the position tracker
//! and its consumers.
//!
//! All distances are surface distances in meters computed with the
//! haversine formula over a spherical Earth model. Bearings are initial
//! great-circle bearings in degrees, normalized to `[0, 360)`.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (spherical model)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// The 16 compass points, clockwise from north
const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// A geographic coordinate in degrees.
///
/// Valid latitudes are `[-90, 90]`, valid longitudes `[-180, 180]`.
/// Construction does not validate; call [`Coordinate::is_valid`] where
/// values come from an untrusted source (configuration, the network).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl Coordinate {
    /// Create a new coordinate from latitude and longitude in degrees.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are inside the valid geographic ranges.
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

/// Great-circle surface distance between two coordinates in meters.
///
/// Uses the haversine formula, which is numerically stable for the
/// small distances the send-suppression policy compares against.
///
/// # Examples
///
/// ```
/// use geotrack::geo::{distance_meters, Coordinate};
///
/// let berlin = Coordinate::new(52.5200, 13.4050);
/// let paris = Coordinate::new(48.8566, 2.3522);
///
/// let meters = distance_meters(berlin, paris);
/// assert!((meters / 1000.0 - 878.0).abs() < 10.0); // ~878 km
/// ```
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial great-circle bearing from `a` to `b` in degrees `[0, 360)`.
///
/// The bearing from a point to itself is defined as 0.
pub fn bearing_degrees(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let y = d_lng.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// 16-wind compass point ("N", "NNE", ...) for the bearing from `a` to `b`.
pub fn compass_direction(a: Coordinate, b: Coordinate) -> &'static str {
    let bearing = bearing_degrees(a, b);
    let index = ((bearing + 11.25) / 22.5) as usize % 16;
    COMPASS_POINTS[index]
}
