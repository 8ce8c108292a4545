//! Nearest-neighbor ordering of the stops inside one route.
//!
//! Starting from the first stop of the list (not the depot), the next stop is
//! always the closest unvisited one. O(n²), no improvement phase.

use tracing::debug;

use crate::catalog::{ClientCatalog, ClientId};
use crate::geo::{self, Coordinate};
use crate::route::Route;

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteSequencer;

impl RouteSequencer {
    pub fn new() -> Self {
        Self
    }

    /// Visit order over `points` as indices into the input.
    ///
    /// Ties go to the stop that appears first in the input. Lists of two stops
    /// or fewer come back unchanged.
    pub fn order(&self, points: &[Coordinate]) -> Vec<usize> {
        let n = points.len();
        if n <= 2 {
            return (0..n).collect();
        }

        let mut order = Vec::with_capacity(n);
        let mut remaining: Vec<usize> = (1..n).collect();
        order.push(0);

        while !remaining.is_empty() {
            let current = points[order[order.len() - 1]];
            let mut nearest = 0;
            let mut nearest_km = geo::distance_km(current, points[remaining[0]]);
            for (slot, &candidate) in remaining.iter().enumerate().skip(1) {
                let km = geo::distance_km(current, points[candidate]);
                if km < nearest_km {
                    nearest = slot;
                    nearest_km = km;
                }
            }
            order.push(remaining.remove(nearest));
        }

        order
    }

    /// Reorder client ids by location. Clients the catalog cannot locate keep
    /// their relative order and go after the located ones.
    pub fn sequence(&self, stops: &[ClientId], catalog: &ClientCatalog) -> Vec<ClientId> {
        let (located, unlocated): (Vec<(&ClientId, Option<Coordinate>)>, Vec<_>) = stops
            .iter()
            .map(|id| (id, catalog.location_of(id)))
            .partition(|(_, location)| location.is_some());

        let points: Vec<Coordinate> = located.iter().filter_map(|(_, p)| *p).collect();
        let mut sequenced: Vec<ClientId> = self
            .order(&points)
            .into_iter()
            .map(|i| located[i].0.clone())
            .collect();
        sequenced.extend(unlocated.into_iter().map(|(id, _)| id.clone()));
        sequenced
    }

    /// Reorder a route in place.
    pub fn sequence_route(&self, route: &mut Route, catalog: &ClientCatalog) {
        let ordered = self.sequence(&route.stops, catalog);
        debug!(route = %route.id, stops = ordered.len(), "route sequenced");
        route.stops = ordered;
    }

    /// Straight-line length of a visit order in kilometers, optionally leaving
    /// from and returning to a depot.
    pub fn path_length_km(&self, points: &[Coordinate], depot: Option<Coordinate>) -> f64 {
        let legs: f64 = points
            .windows(2)
            .map(|pair| geo::distance_km(pair[0], pair[1]))
            .sum();
        match (depot, points.first(), points.last()) {
            (Some(depot), Some(&first), Some(&last)) => {
                legs + geo::distance_km(depot, first) + geo::distance_km(last, depot)
            }
            _ => legs,
        }
    }
}
