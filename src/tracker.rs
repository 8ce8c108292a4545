//! Live execution of day routes.
//!
//! The tracker shares the planner's state lock: user actions, position samples
//! and the background progress ticker all write through it, so status and
//! progress updates are serialized. At most one route is active at a time.
//!
//! Status changes that move the ticker hold the ticker slot from the
//! transition through the ticker swap. Lock order is ticker slot, then state.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::ClientId;
use crate::error::{PlanningError, Result};
use crate::geo::{self, Coordinate};
use crate::planner::{self, PlanningState};
use crate::route::{Route, RouteId, RouteStatus};
use crate::settings::ActiveRoutePolicy;
use crate::store::CompletedRouteResult;
use crate::traits::{Clock, PlanningRepository};

/// One reading from the position feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub position: Coordinate,
    pub recorded_at: DateTime<Utc>,
}

/// An unvisited stop within the arrival radius of the latest position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityAlert {
    pub client: ClientId,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub route: RouteId,
    /// Nearest first.
    pub alerts: Vec<ProximityAlert>,
    /// First unvisited stop in route order and the distance to it.
    pub next_stop: Option<(ClientId, f64)>,
}

struct Ticker {
    route: RouteId,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct RouteExecutionTracker {
    state: Arc<Mutex<PlanningState>>,
    repository: Arc<dyn PlanningRepository>,
    clock: Arc<dyn Clock>,
    ticker: Mutex<Option<Ticker>>,
}

impl RouteExecutionTracker {
    pub fn new(
        state: Arc<Mutex<PlanningState>>,
        repository: Arc<dyn PlanningRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            repository,
            clock,
            ticker: Mutex::new(None),
        }
    }

    /// Start a planned route or resume a paused one.
    pub fn start(&self, id: &RouteId) -> Result<()> {
        let now = self.clock.now();
        let mut slot = self.slot();
        let interval = {
            let mut state = planner::lock(&self.state);
            let status = state.route(id)?.status;
            if !status.can_transition_to(RouteStatus::Active) {
                return Err(PlanningError::State {
                    route: id.clone(),
                    action: "start",
                    status,
                });
            }

            let other = state.active_route().map(|route| route.id.clone());
            if let Some(other) = other {
                match state.settings.active_route_policy {
                    ActiveRoutePolicy::Reject => {
                        return Err(PlanningError::AnotherRouteActive { active: other });
                    }
                    ActiveRoutePolicy::PauseOther => {
                        let route = state.route_mut(&other)?;
                        route.status = RouteStatus::Paused;
                        route.paused_at = Some(now);
                        info!(route = %other, "route paused to start another");
                    }
                }
            }

            let visit_minutes = state.settings.visit_duration_minutes;
            let interval = state.settings.progress_interval_secs;
            let route = state.route_mut(id)?;
            let resumed = route.status == RouteStatus::Paused;
            route.status = RouteStatus::Active;
            route.started_at.get_or_insert(now);
            route.paused_at = None;
            route.progress.total = route.stops.len();
            let visited = route.progress.visited;
            refresh(route, visited, visit_minutes, now);
            info!(route = %id, stops = route.len(), resumed, "route started");
            interval
        };

        // The previous ticker, if any, belonged to the route just paused.
        stop_ticker(&mut slot, None);
        *slot = self.spawn_ticker(id.clone(), Duration::from_secs(interval));
        Ok(())
    }

    pub fn pause(&self, id: &RouteId) -> Result<()> {
        let now = self.clock.now();
        let mut slot = self.slot();
        {
            let mut state = planner::lock(&self.state);
            let route = state.route_mut(id)?;
            transition(route, RouteStatus::Paused, "pause")?;
            route.paused_at = Some(now);
            info!(route = %id, visited = route.progress.visited, "route paused");
        }
        stop_ticker(&mut slot, Some(id));
        Ok(())
    }

    /// Finish a route and record its result.
    ///
    /// The completion stands even when writing the result fails; the store
    /// error is returned after the fact.
    pub fn complete(&self, id: &RouteId) -> Result<CompletedRouteResult> {
        let now = self.clock.now();
        let mut slot = self.slot();
        let result = {
            let mut state = planner::lock(&self.state);
            let route = state.route_mut(id)?;
            transition(route, RouteStatus::Completed, "complete")?;
            route.completed_at = Some(now);
            let actual_hours = route
                .started_at
                .map(|started| round2((now - started).num_seconds() as f64 / 3600.0))
                .unwrap_or(0.0);
            route.actual_hours = Some(actual_hours);
            route.progress.updated_at = Some(now);
            info!(route = %id, actual_hours, estimated_hours = route.estimated_hours, "route completed");

            CompletedRouteResult {
                route_id: route.id.clone(),
                name: route.name.clone(),
                day: route.day,
                clients: route.len(),
                visited: route.progress.visited,
                estimated_hours: route.estimated_hours,
                actual_hours,
                efficiency: route.efficiency,
                completed_at: now,
            }
        };

        stop_ticker(&mut slot, Some(id));
        drop(slot);
        self.repository.append_result(result.clone())?;
        Ok(result)
    }

    /// Set the visited count of an active route. Returns `false` without
    /// touching anything when the route is not active.
    pub fn update_progress(&self, id: &RouteId, visited: usize) -> Result<bool> {
        let now = self.clock.now();
        let mut state = planner::lock(&self.state);
        let visit_minutes = state.settings.visit_duration_minutes;
        let route = state.route_mut(id)?;
        if route.status != RouteStatus::Active {
            debug!(route = %id, status = %route.status, "progress update ignored");
            return Ok(false);
        }
        refresh(route, visited, visit_minutes, now);
        debug!(route = %id, percent = route.progress.percent, "progress updated");
        Ok(true)
    }

    /// Mark one stop visited. Repeating a visit changes nothing. Returns
    /// `false` when the route is not active or the client is not one of its
    /// stops.
    pub fn record_visit(&self, id: &RouteId, client: &ClientId) -> Result<bool> {
        let now = self.clock.now();
        let mut state = planner::lock(&self.state);
        let visit_minutes = state.settings.visit_duration_minutes;
        let route = state.route_mut(id)?;
        if route.status != RouteStatus::Active || !route.contains(client) {
            return Ok(false);
        }
        if !route.progress.visited_stops.contains(client) {
            route.progress.visited_stops.push(client.clone());
        }
        let visited = route.progress.visited.max(route.progress.visited_stops.len());
        refresh(route, visited, visit_minutes, now);
        Ok(true)
    }

    /// Feed a position sample to the active route. `None` when no route is
    /// active.
    pub fn record_position(&self, sample: PositionSample) -> Option<PositionUpdate> {
        let mut state = planner::lock(&self.state);
        let PlanningState {
            settings,
            catalog,
            routes,
            ..
        } = &mut *state;
        let route = routes.iter_mut().find(|route| route.status == RouteStatus::Active)?;
        route.progress.last_position = Some(sample.position);
        route.progress.updated_at = Some(sample.recorded_at);

        let unvisited: Vec<(&ClientId, f64)> = route
            .stops
            .iter()
            .filter(|stop| !route.progress.visited_stops.contains(stop))
            .filter_map(|stop| {
                catalog
                    .location_of(stop)
                    .map(|point| (stop, geo::distance_km(sample.position, point) * 1000.0))
            })
            .collect();

        let next_stop = unvisited.first().map(|(id, m)| ((*id).clone(), *m));
        let mut alerts: Vec<ProximityAlert> = unvisited
            .iter()
            .filter(|(_, m)| *m <= settings.arrival_radius_m)
            .map(|(id, m)| ProximityAlert {
                client: (*id).clone(),
                distance_m: *m,
            })
            .collect();
        alerts.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

        if !alerts.is_empty() {
            info!(route = %route.id, client = %alerts[0].client, distance_m = alerts[0].distance_m, "approaching stop");
        }

        Some(PositionUpdate {
            route: route.id.clone(),
            alerts,
            next_stop,
        })
    }

    /// Route the background ticker is currently refreshing.
    pub fn ticking_route(&self) -> Option<RouteId> {
        self.slot().as_ref().map(|ticker| ticker.route.clone())
    }

    fn slot(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_ticker(&self, route: RouteId, interval: Duration) -> Option<Ticker> {
        let (stop, stopped) = mpsc::channel::<()>();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let ticking = route.clone();

        let spawned = thread::Builder::new()
            .name("route-progress".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(&state, clock.as_ref(), &ticking),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                debug!(route = %route, interval_secs = interval.as_secs(), "progress ticker started");
                Some(Ticker {
                    route,
                    stop,
                    handle,
                })
            }
            Err(err) => {
                warn!(route = %route, error = %err, "progress ticker unavailable");
                None
            }
        }
    }
}

impl Drop for RouteExecutionTracker {
    fn drop(&mut self) {
        let slot = self.ticker.get_mut().unwrap_or_else(PoisonError::into_inner);
        stop_ticker(slot, None);
    }
}

/// Stop the ticker in `slot` if it refreshes `route` (or any route when
/// `None`). The state lock must not be held: the ticker thread takes it.
fn stop_ticker(slot: &mut Option<Ticker>, route: Option<&RouteId>) {
    if let (Some(ticker), Some(route)) = (slot.as_ref(), route) {
        if ticker.route != *route {
            return;
        }
    }
    if let Some(ticker) = slot.take() {
        let _ = ticker.stop.send(());
        if ticker.handle.join().is_err() {
            warn!(route = %ticker.route, "progress ticker panicked");
        }
        debug!(route = %ticker.route, "progress ticker stopped");
    }
}

fn tick(state: &Mutex<PlanningState>, clock: &dyn Clock, id: &RouteId) {
    let now = clock.now();
    let mut state = planner::lock(state);
    let visit_minutes = state.settings.visit_duration_minutes;
    if let Ok(route) = state.route_mut(id) {
        if route.status == RouteStatus::Active {
            let visited = route.progress.visited;
            refresh(route, visited, visit_minutes, now);
        }
    }
}

fn transition(route: &mut Route, next: RouteStatus, action: &'static str) -> Result<()> {
    if route.status.can_transition_to(next) {
        route.status = next;
        Ok(())
    } else {
        Err(PlanningError::State {
            route: route.id.clone(),
            action,
            status: route.status,
        })
    }
}

/// Recompute percent, remaining and ETA from a visited count.
fn refresh(route: &mut Route, visited: usize, visit_minutes: u32, now: DateTime<Utc>) {
    let total = route.stops.len();
    let visited = visited.min(total);
    let remaining = total - visited;
    let progress = &mut route.progress;
    progress.total = total;
    progress.visited = visited;
    progress.remaining = remaining;
    progress.percent = if total == 0 {
        0
    } else {
        (visited * 100 / total) as u8
    };
    progress.estimated_completion =
        Some(now + TimeDelta::minutes(remaining as i64 * visit_minutes as i64));
    progress.updated_at = Some(now);
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
