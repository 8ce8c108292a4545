//! Great-circle geometry helpers.
//!
//! Everything here is pure. Functions that need at least one point return
//! `Option` so callers treat degenerate input as "no location" instead of
//! silently landing on (0, 0).

use serde::{Deserialize, Serialize};

/// Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Padded bounding box around a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn contains(&self, point: Coordinate) -> bool {
        point.lat <= self.north
            && point.lat >= self.south
            && point.lng <= self.east
            && point.lng >= self.west
    }
}

pub fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

pub fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Haversine distance between two points in kilometers.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = to_radians(a.lat);
    let lat2 = to_radians(b.lat);
    let delta_lat = to_radians(b.lat - a.lat);
    let delta_lng = to_radians(b.lng - a.lng);

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial bearing from `a` towards `b`, in degrees clockwise from north
/// (0..360).
pub fn initial_bearing_deg(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = to_radians(a.lat);
    let lat2 = to_radians(b.lat);
    let delta_lng = to_radians(b.lng - a.lng);

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    (to_degrees(y.atan2(x)) + 360.0) % 360.0
}

/// Arithmetic mean of latitudes and longitudes.
///
/// Good enough at the scale of a few hundred kilometers; this is not a true
/// spherical centroid.
pub fn centroid(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sum_lat, sum_lng) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Some(Coordinate::new(sum_lat / n, sum_lng / n))
}

/// Bounding box of `points`, grown by `padding` degrees on every side.
pub fn bounds(points: &[Coordinate], padding: f64) -> Option<Bounds> {
    let first = points.first()?;
    let mut b = Bounds {
        north: first.lat,
        south: first.lat,
        east: first.lng,
        west: first.lng,
    };
    for p in &points[1..] {
        b.north = b.north.max(p.lat);
        b.south = b.south.min(p.lat);
        b.east = b.east.max(p.lng);
        b.west = b.west.min(p.lng);
    }
    b.north += padding;
    b.south -= padding;
    b.east += padding;
    b.west -= padding;
    Some(b)
}
