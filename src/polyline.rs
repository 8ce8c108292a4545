//! Route geometry as decoded coordinate sequences.
//!
//! Providers hand geometry over in their own formats (GeoJSON `[lng, lat]`
//! pairs for OSRM); conversion happens once at that boundary and the rest of
//! the crate only sees [`Coordinate`]s.

use serde::{Deserialize, Serialize};

use crate::geo::{self, Coordinate};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Build from GeoJSON-ordered `[lng, lat]` pairs.
    pub fn from_lng_lat(pairs: &[[f64; 2]]) -> Self {
        Self {
            points: pairs.iter().map(|&[lng, lat]| Coordinate::new(lat, lng)).collect(),
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append another line, dropping its first point when it repeats our last.
    pub fn extend(&mut self, other: Polyline) {
        let mut points = other.points.into_iter().peekable();
        if let (Some(last), Some(first)) = (self.points.last(), points.peek()) {
            if last == first {
                points.next();
            }
        }
        self.points.extend(points);
    }

    /// Great-circle length in kilometers.
    pub fn length_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| geo::distance_km(pair[0], pair[1]))
            .sum()
    }
}
