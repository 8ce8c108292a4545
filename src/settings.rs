//! Process-wide optimization settings.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};
use crate::geo::Coordinate;

/// Default depot: the warehouse at Moshav Sharona.
pub const DEFAULT_DEPOT: Coordinate = Coordinate::new(32.7254465, 35.4669505);

/// Most days a planning week can have.
pub const MAX_WORK_DAYS: u8 = 5;

/// Day-assignment algorithm. Only one strategy exists today; new ones get a new
/// variant plus an [`AssignmentStrategy`](crate::assign::AssignmentStrategy)
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    MegaClusterFirst,
}

/// What to do with a mega-cluster whose estimated hours exceed the daily budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OversizedClusterPolicy {
    /// Members go back into the pool of individual stops.
    #[default]
    Dissolve,
    /// Split the cluster in member order across consecutive unseeded days.
    Overflow,
    /// Give the whole cluster its own day and flag the route as over capacity.
    KeepWhole,
}

/// What `start` does when another route is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveRoutePolicy {
    #[default]
    Reject,
    PauseOther,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Proximity radius in kilometers.
    pub radius_km: f64,
    /// Minimum member count for a cluster to count as mega.
    pub mega_threshold: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            radius_km: 2.0,
            mega_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    pub algorithm: Algorithm,
    /// Working-hours budget per day.
    pub max_hours_per_day: f64,
    /// Visit duration used when a client record has none.
    pub visit_duration_minutes: u32,
    /// Planned departure time for every route.
    pub start_time: NaiveTime,
    pub max_days_per_week: u8,
    /// Travel time budgeted per stop when estimating route hours.
    pub travel_overhead_minutes: u32,
    pub cluster: ClusterSettings,
    pub oversized_cluster_policy: OversizedClusterPolicy,
    pub active_route_policy: ActiveRoutePolicy,
    /// Maximum intermediate stops per routing-provider request.
    pub waypoint_ceiling: usize,
    /// Period of the background progress recomputation while a route is active.
    pub progress_interval_secs: u64,
    /// Distance under which a position sample raises a proximity alert.
    pub arrival_radius_m: f64,
    pub depot: Coordinate,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::MegaClusterFirst,
            max_hours_per_day: 12.0,
            visit_duration_minutes: 15,
            start_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            max_days_per_week: MAX_WORK_DAYS,
            travel_overhead_minutes: 10,
            cluster: ClusterSettings::default(),
            oversized_cluster_policy: OversizedClusterPolicy::Dissolve,
            active_route_policy: ActiveRoutePolicy::Reject,
            waypoint_ceiling: crate::batch::DEFAULT_WAYPOINT_CEILING,
            progress_interval_secs: 30,
            arrival_radius_m: 500.0,
            depot: DEFAULT_DEPOT,
        }
    }
}

impl OptimizationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_hours_per_day.is_finite() && self.max_hours_per_day > 0.0) {
            return Err(PlanningError::invalid_settings(
                "max_hours_per_day must be a positive number",
            ));
        }
        if self.visit_duration_minutes == 0 {
            return Err(PlanningError::invalid_settings(
                "visit_duration_minutes must be at least 1",
            ));
        }
        if self.max_days_per_week == 0 || self.max_days_per_week > MAX_WORK_DAYS {
            return Err(PlanningError::invalid_settings(format!(
                "max_days_per_week must be between 1 and {}",
                MAX_WORK_DAYS
            )));
        }
        if !(self.cluster.radius_km.is_finite() && self.cluster.radius_km > 0.0) {
            return Err(PlanningError::invalid_settings(
                "cluster radius must be a positive number of kilometers",
            ));
        }
        if self.cluster.mega_threshold < 2 {
            return Err(PlanningError::invalid_settings(
                "mega_threshold must be at least 2",
            ));
        }
        if self.waypoint_ceiling == 0 {
            return Err(PlanningError::invalid_settings(
                "waypoint_ceiling must be at least 1",
            ));
        }
        if self.progress_interval_secs == 0 {
            return Err(PlanningError::invalid_settings(
                "progress_interval_secs must be at least 1",
            ));
        }
        if !(self.arrival_radius_m.is_finite() && self.arrival_radius_m >= 0.0) {
            return Err(PlanningError::invalid_settings(
                "arrival_radius_m must be a non-negative number",
            ));
        }
        if !self.depot.is_valid() {
            return Err(PlanningError::invalid_settings("depot coordinate is invalid"));
        }
        Ok(())
    }

    pub fn max_minutes_per_day(&self) -> f64 {
        self.max_hours_per_day * 60.0
    }
}
