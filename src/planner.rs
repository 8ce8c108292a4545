//! The planning state owner.
//!
//! A [`Planner`] holds the current catalog, clusters and day routes behind a
//! single lock. Re-optimization computes a complete new plan from a snapshot
//! taken under the lock, then swaps it in at once; readers never observe a
//! half-built plan. Repository and routing-provider calls happen with the lock
//! released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::assign::{self, UnassignedClient};
use crate::batch::WaypointBatcher;
use crate::catalog::{CatalogStats, ClientCatalog, ClientRecord};
use crate::cluster::{Cluster, ClusterDetector};
use crate::error::{InputDataError, PlanningError, Result};
use crate::route::{Route, RouteId, RouteStatus};
use crate::sequence::RouteSequencer;
use crate::settings::OptimizationSettings;
use crate::store::{ClusterSummary, OptimizationRecord, RouteSummary};
use crate::traits::{Clock, PlanningRepository, ProviderRoute, RouteRequest, RoutingProvider};
use crate::tracker::RouteExecutionTracker;

/// Everything the engine knows about the current plan.
#[derive(Debug, Clone, Default)]
pub struct PlanningState {
    pub settings: OptimizationSettings,
    pub catalog: ClientCatalog,
    pub clusters: Vec<Cluster>,
    pub routes: Vec<Route>,
    pub unassigned: Vec<UnassignedClient>,
    /// Bumped on every successful re-optimization.
    pub revision: u64,
    /// Bumped whenever the catalog is replaced.
    pub catalog_generation: u64,
    pub optimized_at: Option<DateTime<Utc>>,
}

impl PlanningState {
    pub fn route(&self, id: &RouteId) -> Result<&Route> {
        self.routes
            .iter()
            .find(|route| route.id == *id)
            .ok_or_else(|| PlanningError::UnknownRoute(id.clone()))
    }

    pub fn route_mut(&mut self, id: &RouteId) -> Result<&mut Route> {
        self.routes
            .iter_mut()
            .find(|route| route.id == *id)
            .ok_or_else(|| PlanningError::UnknownRoute(id.clone()))
    }

    /// The route currently being driven, if any.
    pub fn active_route(&self) -> Option<&Route> {
        self.routes.iter().find(|route| route.status == RouteStatus::Active)
    }

    fn in_progress(&self) -> Option<&Route> {
        self.routes.iter().find(|route| route.status.in_progress())
    }
}

pub(crate) fn lock(state: &Mutex<PlanningState>) -> MutexGuard<'_, PlanningState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStatistics {
    pub total_clients: usize,
    pub located_clients: usize,
    pub assigned_clients: usize,
    pub unassigned_clients: usize,
    pub total_clusters: usize,
    pub mega_clusters: usize,
    pub routes_with_stops: usize,
    pub total_estimated_hours: f64,
    /// Assigned stops per planned hour across all routes.
    pub efficiency: f64,
    pub catalog: CatalogStats,
}

/// A consistent copy of the plan for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSnapshot {
    pub revision: u64,
    pub optimized_at: Option<DateTime<Utc>>,
    pub clusters: Vec<Cluster>,
    pub routes: Vec<Route>,
    pub unassigned: Vec<UnassignedClient>,
    pub statistics: PlanStatistics,
}

/// Outcome of [`Planner::reoptimize`].
#[derive(Debug)]
pub struct ReoptimizeReport {
    pub revision: u64,
    pub assigned: usize,
    pub unassigned: Vec<UnassignedClient>,
    /// Capacity warning when some clients did not fit. The plan is still
    /// published.
    pub capacity_warning: Option<PlanningError>,
}

pub struct Planner {
    state: Arc<Mutex<PlanningState>>,
    repository: Arc<dyn PlanningRepository>,
    clock: Arc<dyn Clock>,
    tracker: RouteExecutionTracker,
}

impl Planner {
    /// Create a planner with settings read from the repository, or defaults
    /// when none are stored.
    pub fn new(repository: Arc<dyn PlanningRepository>, clock: Arc<dyn Clock>) -> Result<Self> {
        let settings = match repository.load_settings()? {
            Some(settings) => {
                settings.validate()?;
                settings
            }
            None => OptimizationSettings::default(),
        };
        info!(
            max_hours = settings.max_hours_per_day,
            days = settings.max_days_per_week,
            "planner initialized"
        );

        let state = Arc::new(Mutex::new(PlanningState {
            settings,
            ..Default::default()
        }));
        let tracker = RouteExecutionTracker::new(state.clone(), repository.clone(), clock.clone());

        Ok(Self {
            state,
            repository,
            clock,
            tracker,
        })
    }

    pub fn tracker(&self) -> &RouteExecutionTracker {
        &self.tracker
    }

    pub fn settings(&self) -> OptimizationSettings {
        lock(&self.state).settings.clone()
    }

    /// Validate, persist, then apply new settings. They take effect on the next
    /// re-optimization.
    pub fn update_settings(&self, settings: OptimizationSettings) -> Result<()> {
        settings.validate()?;
        self.repository.save_settings(&settings)?;
        lock(&self.state).settings = settings;
        info!("settings updated");
        Ok(())
    }

    /// Replace the client catalog. The previous plan is discarded; call
    /// [`Planner::reoptimize`] to build a new one.
    pub fn load_clients(&self, records: Vec<ClientRecord>) -> Result<Vec<InputDataError>> {
        let (depot, visit_minutes) = {
            let state = lock(&self.state);
            if let Some(route) = state.in_progress() {
                return Err(PlanningError::PlanInProgress {
                    route: route.id.clone(),
                });
            }
            (state.settings.depot, state.settings.visit_duration_minutes)
        };

        let (catalog, issues) = ClientCatalog::load(records, depot, visit_minutes);

        let mut state = lock(&self.state);
        if let Some(route) = state.in_progress() {
            return Err(PlanningError::PlanInProgress {
                route: route.id.clone(),
            });
        }
        state.catalog = catalog;
        state.catalog_generation += 1;
        state.clusters.clear();
        state.routes.clear();
        state.unassigned.clear();
        Ok(issues)
    }

    /// Rebuild clusters and day routes from the current catalog and settings.
    ///
    /// Rejected while any route is active or paused, and when the catalog is
    /// replaced before the new plan is swapped in. The same catalog and
    /// settings always produce the same plan.
    pub fn reoptimize(&self) -> Result<ReoptimizeReport> {
        let (settings, mut catalog, generation) = {
            let state = lock(&self.state);
            if let Some(route) = state.in_progress() {
                return Err(PlanningError::PlanInProgress {
                    route: route.id.clone(),
                });
            }
            (
                state.settings.clone(),
                state.catalog.clone(),
                state.catalog_generation,
            )
        };
        let now = self.clock.now();

        let clusters = ClusterDetector::new(settings.cluster.clone()).detect(&catalog, settings.depot);
        let strategy = assign::strategy_for(settings.algorithm);
        let mut assignment = strategy.assign(&catalog, &clusters, &settings, now);

        let sequencer = RouteSequencer::new();
        assignment
            .routes
            .par_iter_mut()
            .for_each(|route| sequencer.sequence_route(route, &catalog));

        catalog.set_clusters(
            clusters
                .iter()
                .flat_map(|cluster| cluster.members.iter().map(move |id| (id, cluster.id))),
        );
        catalog.set_routes(
            assignment
                .routes
                .iter()
                .flat_map(|route| route.stops.iter().map(move |id| (id, route.day, &route.id))),
        );

        let capacity_warning = assignment.capacity_error();
        let assigned = assignment.assigned_count();
        let record = OptimizationRecord {
            revision: 0,
            created_at: now,
            algorithm: settings.algorithm,
            total_clients: catalog.len(),
            routes: assignment.routes.iter().map(route_summary).collect(),
            mega_clusters: clusters.iter().filter(|c| c.mega).map(cluster_summary).collect(),
            unassigned: assignment.unassigned.iter().map(|u| u.client.clone()).collect(),
        };

        let revision = {
            let mut state = lock(&self.state);
            // A route may have been started from the old plan meanwhile.
            if let Some(route) = state.in_progress() {
                return Err(PlanningError::PlanInProgress {
                    route: route.id.clone(),
                });
            }
            if state.catalog_generation != generation {
                warn!("catalog replaced during re-optimization, plan discarded");
                return Err(PlanningError::CatalogReplaced);
            }
            state.revision += 1;
            state.catalog = catalog;
            state.clusters = clusters;
            state.routes = assignment.routes;
            state.unassigned = assignment.unassigned.clone();
            state.optimized_at = Some(now);
            state.revision
        };

        info!(
            revision,
            algorithm = strategy.name(),
            assigned,
            unassigned = assignment.unassigned.len(),
            "plan re-optimized"
        );
        if let Some(warning) = &capacity_warning {
            warn!(%warning, "plan published with unassigned clients");
        }

        self.repository.append_history(OptimizationRecord { revision, ..record })?;

        Ok(ReoptimizeReport {
            revision,
            assigned,
            unassigned: assignment.unassigned,
            capacity_warning,
        })
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        let state = lock(&self.state);
        PlanSnapshot {
            revision: state.revision,
            optimized_at: state.optimized_at,
            clusters: state.clusters.clone(),
            routes: state.routes.clone(),
            unassigned: state.unassigned.clone(),
            statistics: statistics(&state),
        }
    }

    pub fn statistics(&self) -> PlanStatistics {
        statistics(&lock(&self.state))
    }

    pub fn route(&self, id: &RouteId) -> Option<Route> {
        lock(&self.state).route(id).ok().cloned()
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        lock(&self.state).clusters.clone()
    }

    /// Mega-clusters by descending priority.
    pub fn mega_clusters(&self) -> Vec<Cluster> {
        let mut megas: Vec<Cluster> = lock(&self.state)
            .clusters
            .iter()
            .filter(|cluster| cluster.mega)
            .cloned()
            .collect();
        megas.sort_by(|a, b| b.priority().total_cmp(&a.priority()).then_with(|| a.id.cmp(&b.id)));
        megas
    }

    /// Run a read-only query against the current catalog.
    pub fn with_catalog<R>(&self, query: impl FnOnce(&ClientCatalog) -> R) -> R {
        query(&lock(&self.state).catalog)
    }

    pub fn history(&self) -> Result<Vec<OptimizationRecord>> {
        Ok(self.repository.history()?)
    }

    /// Re-run nearest-neighbor ordering on one planned route.
    pub fn resequence_route(&self, id: &RouteId) -> Result<()> {
        let mut state = lock(&self.state);
        let PlanningState { catalog, routes, .. } = &mut *state;
        let route = routes
            .iter_mut()
            .find(|route| route.id == *id)
            .ok_or_else(|| PlanningError::UnknownRoute(id.clone()))?;
        if route.status != RouteStatus::Planned {
            return Err(PlanningError::State {
                route: id.clone(),
                action: "resequence",
                status: route.status,
            });
        }
        RouteSequencer::new().sequence_route(route, catalog);
        Ok(())
    }

    /// Provider requests for a route, depot to depot, split at the configured
    /// waypoint ceiling. Stops without a location are left out.
    pub fn route_requests(&self, id: &RouteId, optimize_order: bool) -> Result<Vec<RouteRequest>> {
        let state = lock(&self.state);
        let route = state.route(id)?;
        let stops: Vec<_> = route
            .stops
            .iter()
            .filter_map(|client| state.catalog.location_of(client))
            .collect();
        let batcher = WaypointBatcher::new(state.settings.waypoint_ceiling)?;
        let depot = state.settings.depot;
        Ok(batcher.requests(&stops, depot, depot, optimize_order))
    }

    /// Send every chunk of a route to `provider`, in order. The first provider
    /// failure is returned as-is; there is no retry.
    pub fn request_route(
        &self,
        provider: &dyn RoutingProvider,
        id: &RouteId,
        optimize_order: bool,
    ) -> Result<Vec<ProviderRoute>> {
        let requests = self.route_requests(id, optimize_order)?;
        let batcher = WaypointBatcher::new(provider.max_waypoints())?;
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            if request.waypoints.len() > batcher.ceiling() {
                // Provider is stricter than the configured ceiling.
                for sub in batcher.requests(&request.waypoints, request.origin, request.destination, optimize_order) {
                    results.push(provider.route(&sub)?);
                }
            } else {
                results.push(provider.route(&request)?);
            }
        }
        info!(route = %id, chunks = results.len(), "route sent to provider");
        Ok(results)
    }
}

fn statistics(state: &PlanningState) -> PlanStatistics {
    let catalog = state.catalog.statistics();
    let assigned_clients: usize = state.routes.iter().map(Route::len).sum();
    let total_estimated_hours: f64 = state.routes.iter().map(|route| route.estimated_hours).sum();
    PlanStatistics {
        total_clients: catalog.total_clients,
        located_clients: catalog.located_clients,
        assigned_clients,
        unassigned_clients: state.unassigned.len(),
        total_clusters: state.clusters.len(),
        mega_clusters: state.clusters.iter().filter(|c| c.mega).count(),
        routes_with_stops: state.routes.iter().filter(|route| !route.is_empty()).count(),
        total_estimated_hours,
        efficiency: crate::route::efficiency(assigned_clients, total_estimated_hours),
        catalog,
    }
}

fn route_summary(route: &Route) -> RouteSummary {
    RouteSummary {
        id: route.id.clone(),
        day: route.day,
        name: route.name.clone(),
        clients: route.len(),
        estimated_hours: route.estimated_hours,
        efficiency: route.efficiency,
    }
}

fn cluster_summary(cluster: &Cluster) -> ClusterSummary {
    ClusterSummary {
        id: cluster.id,
        name: cluster.name.clone(),
        size: cluster.size(),
        efficiency: cluster.efficiency,
    }
}
