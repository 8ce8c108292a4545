//! day-route-planner core
//!
//! Geo-clustering and multi-day route planning for a fleet serving scattered
//! clients under a daily working-hours budget, plus live tracking of the
//! route being driven.

pub mod assign;
pub mod batch;
pub mod catalog;
pub mod cluster;
pub mod error;
pub mod geo;
pub mod haversine;
pub mod osrm;
pub mod osrm_data;
pub mod planner;
pub mod polyline;
pub mod route;
pub mod sequence;
pub mod settings;
pub mod store;
pub mod tracker;
pub mod traits;

pub use assign::{Assignment, AssignmentStrategy, DayAssigner, UnassignedClient, UnassignedReason};
pub use batch::WaypointBatcher;
pub use catalog::{Client, ClientCatalog, ClientId, ClientRecord, WorkDay};
pub use cluster::{Cluster, ClusterDetector, ClusterId};
pub use error::{InputDataError, PlanningError, ProviderError, Result, StoreError};
pub use geo::Coordinate;
pub use planner::{PlanSnapshot, Planner, PlanningState};
pub use route::{Route, RouteId, RouteStatus};
pub use sequence::RouteSequencer;
pub use settings::OptimizationSettings;
pub use tracker::{PositionSample, RouteExecutionTracker};
