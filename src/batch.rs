//! Splitting stop lists to fit a routing provider's waypoint limit.
//!
//! Chunks are independent requests; stitching their legs or geometry back
//! together is left to the caller.

use crate::error::{PlanningError, Result};
use crate::geo::Coordinate;
use crate::traits::RouteRequest;

/// 25 waypoints per request including origin and destination.
pub const DEFAULT_WAYPOINT_CEILING: usize = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaypointBatcher {
    ceiling: usize,
}

impl Default for WaypointBatcher {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_WAYPOINT_CEILING,
        }
    }
}

impl WaypointBatcher {
    pub fn new(ceiling: usize) -> Result<Self> {
        if ceiling == 0 {
            return Err(PlanningError::invalid_settings(
                "waypoint ceiling must be at least 1",
            ));
        }
        Ok(Self { ceiling })
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Number of chunks `len` stops split into.
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.ceiling)
    }

    /// Successive chunks of at most `ceiling` stops, in input order.
    pub fn batches<'a, T>(&self, stops: &'a [T]) -> std::slice::Chunks<'a, T> {
        stops.chunks(self.ceiling)
    }

    /// One request per chunk, each leaving from `origin` and ending at
    /// `destination`.
    pub fn requests(
        &self,
        stops: &[Coordinate],
        origin: Coordinate,
        destination: Coordinate,
        optimize_order: bool,
    ) -> Vec<RouteRequest> {
        self.batches(stops)
            .map(|chunk| RouteRequest {
                origin,
                waypoints: chunk.to_vec(),
                destination,
                optimize_order,
            })
            .collect()
    }
}
