//! Interfaces to the engine's external collaborators.
//!
//! The engine never talks to a routing service, a clock or a storage backend
//! directly. Concrete apps plug their own implementations in here; the crate
//! ships an OSRM client, a haversine estimator and an in-memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, StoreError};
use crate::geo::Coordinate;
use crate::polyline::Polyline;
use crate::settings::OptimizationSettings;
use crate::store::{CompletedRouteResult, OptimizationRecord};

/// One routing request: origin, intermediate stops, destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub waypoints: Vec<Coordinate>,
    pub destination: Coordinate,
    /// Let the provider reorder the intermediate stops.
    pub optimize_order: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_km: f64,
    pub duration_secs: f64,
}

/// What a provider returns for a [`RouteRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRoute {
    /// One leg per hop, origin to destination.
    pub legs: Vec<RouteLeg>,
    /// Optimized order of the request's waypoints, as indices into
    /// `RouteRequest::waypoints`.
    pub waypoint_order: Option<Vec<usize>>,
    pub geometry: Option<Polyline>,
    /// True when the figures are straight-line estimates rather than road
    /// network results.
    pub estimated: bool,
}

impl ProviderRoute {
    pub fn total_distance_km(&self) -> f64 {
        self.legs.iter().map(|leg| leg.distance_km).sum()
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.legs.iter().map(|leg| leg.duration_secs).sum()
    }
}

/// A routing service that turns waypoint lists into legs.
///
/// Failures are returned as-is; retry and backoff belong to the caller.
pub trait RoutingProvider {
    /// Most intermediate stops a single request may carry.
    fn max_waypoints(&self) -> usize;

    fn route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError>;
}

/// Narrow persistence interface used by the planner.
pub trait PlanningRepository: Send + Sync {
    fn load_settings(&self) -> Result<Option<OptimizationSettings>, StoreError>;

    fn save_settings(&self, settings: &OptimizationSettings) -> Result<(), StoreError>;

    /// Record a full re-optimization. Implementations keep only the most recent
    /// entries.
    fn append_history(&self, record: OptimizationRecord) -> Result<(), StoreError>;

    /// Most recent first.
    fn history(&self) -> Result<Vec<OptimizationRecord>, StoreError>;

    fn append_result(&self, result: CompletedRouteResult) -> Result<(), StoreError>;

    fn results(&self) -> Result<Vec<CompletedRouteResult>, StoreError>;
}

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
