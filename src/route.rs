//! Day routes and their execution status.

use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{ClientId, WorkDay};
use crate::geo::Coordinate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(pub String);

impl RouteId {
    /// Identifier of the route planned for `day`.
    pub fn for_day(day: WorkDay) -> Self {
        Self(format!("route-day-{}", day.number()))
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution state of a route.
///
/// `Planned -> Active -> Paused <-> Active -> Completed`; `Completed` is
/// terminal and nothing skips `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    #[default]
    Planned,
    Active,
    Paused,
    Completed,
}

impl RouteStatus {
    pub fn can_transition_to(self, next: RouteStatus) -> bool {
        use RouteStatus::*;
        matches!(
            (self, next),
            (Planned, Active) | (Paused, Active) | (Active, Paused) | (Active, Completed) | (Paused, Completed)
        )
    }

    /// Active or paused: the route has been started and not finished.
    pub fn in_progress(self) -> bool {
        matches!(self, RouteStatus::Active | RouteStatus::Paused)
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteStatus::Planned => "planned",
            RouteStatus::Active => "active",
            RouteStatus::Paused => "paused",
            RouteStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Live progress of a route during the workday.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteProgress {
    /// Stops confirmed one by one through visit events.
    pub visited_stops: Vec<ClientId>,
    pub visited: usize,
    pub total: usize,
    /// Whole percent, rounded down.
    pub percent: u8,
    pub remaining: usize,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub last_position: Option<Coordinate>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub day: WorkDay,
    pub name: String,
    /// Visit order.
    pub stops: Vec<ClientId>,
    pub status: RouteStatus,
    pub estimated_hours: f64,
    /// Stops per estimated hour.
    pub efficiency: f64,
    /// Set only when an oversized cluster was kept whole on purpose.
    pub over_capacity: bool,
    pub planned_start: NaiveTime,
    pub created_at: DateTime<Utc>,
    /// First start only; resuming a paused route keeps it.
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_hours: Option<f64>,
    pub progress: RouteProgress,
}

impl Route {
    pub fn new(day: WorkDay, name: impl Into<String>, planned_start: NaiveTime, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RouteId::for_day(day),
            day,
            name: name.into(),
            stops: Vec::new(),
            status: RouteStatus::Planned,
            estimated_hours: 0.0,
            efficiency: 0.0,
            over_capacity: false,
            planned_start,
            created_at,
            started_at: None,
            paused_at: None,
            completed_at: None,
            actual_hours: None,
            progress: RouteProgress::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn contains(&self, client: &ClientId) -> bool {
        self.stops.contains(client)
    }
}

/// Hours needed for a set of visits: visit time plus a fixed travel overhead
/// per stop.
pub fn estimate_hours(visit_minutes: impl IntoIterator<Item = u32>, overhead_per_stop: u32) -> f64 {
    let (stops, minutes) = visit_minutes
        .into_iter()
        .fold((0u64, 0u64), |(n, total), m| (n + 1, total + m as u64));
    (minutes + stops * overhead_per_stop as u64) as f64 / 60.0
}

/// Stops per hour; zero for an empty or zero-hour route.
pub fn efficiency(stops: usize, hours: f64) -> f64 {
    if hours > 0.0 {
        stops as f64 / hours
    } else {
        0.0
    }
}
