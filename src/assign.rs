//! Cluster-first assignment of clients to working days.
//!
//! Mega-clusters seed the days in priority order, one per day, then every
//! remaining client is spread over the unseeded days under the hours budget.
//! Whatever still does not fit is reported, never dropped.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{ClientCatalog, ClientId, WorkDay};
use crate::cluster::Cluster;
use crate::error::PlanningError;
use crate::route::{self, Route};
use crate::settings::{Algorithm, OptimizationSettings, OversizedClusterPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnassignedReason {
    /// The client has no usable coordinates.
    MissingLocation,
    /// No day had enough hours left for the visit.
    ExceedsCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedClient {
    pub client: ClientId,
    pub reason: UnassignedReason,
}

/// Result of one assignment run: one route per working day plus everything
/// that could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub routes: Vec<Route>,
    pub unassigned: Vec<UnassignedClient>,
}

impl Assignment {
    /// Planning-capacity warning listing every client left out for lack of
    /// hours. `None` when coverage is complete.
    pub fn capacity_error(&self) -> Option<PlanningError> {
        let unassigned: Vec<ClientId> = self
            .unassigned
            .iter()
            .filter(|u| u.reason == UnassignedReason::ExceedsCapacity)
            .map(|u| u.client.clone())
            .collect();
        if unassigned.is_empty() {
            None
        } else {
            Some(PlanningError::Capacity { unassigned })
        }
    }

    pub fn route_of(&self, client: &ClientId) -> Option<&Route> {
        self.routes.iter().find(|route| route.contains(client))
    }

    pub fn assigned_count(&self) -> usize {
        self.routes.iter().map(Route::len).sum()
    }
}

/// A day-assignment algorithm.
pub trait AssignmentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn assign(
        &self,
        catalog: &ClientCatalog,
        clusters: &[Cluster],
        settings: &OptimizationSettings,
        now: DateTime<Utc>,
    ) -> Assignment;
}

pub fn strategy_for(algorithm: Algorithm) -> Box<dyn AssignmentStrategy> {
    match algorithm {
        Algorithm::MegaClusterFirst => Box::new(DayAssigner),
    }
}

/// Mega-cluster-first assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayAssigner;

struct DayPlan {
    route: Route,
    minutes: u64,
    seeded: bool,
}

impl DayPlan {
    fn push(&mut self, client: ClientId, cost: u64) {
        self.route.stops.push(client);
        self.minutes += cost;
    }
}

impl AssignmentStrategy for DayAssigner {
    fn name(&self) -> &'static str {
        "mega-cluster-first"
    }

    fn assign(
        &self,
        catalog: &ClientCatalog,
        clusters: &[Cluster],
        settings: &OptimizationSettings,
        now: DateTime<Utc>,
    ) -> Assignment {
        let budget = settings.max_minutes_per_day();
        let overhead = settings.travel_overhead_minutes as u64;
        let cost = |id: &ClientId| -> u64 {
            catalog
                .get(id)
                .map(|client| client.visit_minutes as u64)
                .unwrap_or(settings.visit_duration_minutes as u64)
                + overhead
        };
        let fits = |used: u64, extra: u64| (used + extra) as f64 <= budget;

        let days = (settings.max_days_per_week as usize).min(WorkDay::ALL.len());
        let mut plans: Vec<DayPlan> = WorkDay::ALL[..days]
            .iter()
            .map(|&day| DayPlan {
                route: Route::new(day, format!("Day {}", day.number()), settings.start_time, now),
                minutes: 0,
                seeded: false,
            })
            .collect();

        let mut placed: HashSet<ClientId> = HashSet::new();

        // Seed days with mega-clusters, highest priority first.
        let mut megas: Vec<&Cluster> = clusters.iter().filter(|cluster| cluster.mega).collect();
        megas.sort_by(|a, b| {
            b.priority()
                .total_cmp(&a.priority())
                .then_with(|| a.id.cmp(&b.id))
        });
        let mut queue: VecDeque<&Cluster> = megas.into();
        let mut day = 0;

        while day < plans.len() {
            let Some(cluster) = queue.pop_front() else { break };
            let minutes: u64 = cluster.members.iter().map(|id| cost(id)).sum();

            if fits(0, minutes) {
                seed(&mut plans[day], cluster, &cluster.name, &mut placed, &cost);
                info!(day = day + 1, cluster = %cluster.id, size = cluster.size(), "day seeded with mega-cluster");
                day += 1;
                continue;
            }

            match settings.oversized_cluster_policy {
                OversizedClusterPolicy::Dissolve => {
                    warn!(
                        cluster = %cluster.id,
                        hours = minutes as f64 / 60.0,
                        "mega-cluster exceeds the daily budget; members will be placed individually"
                    );
                }
                OversizedClusterPolicy::KeepWhole => {
                    warn!(
                        cluster = %cluster.id,
                        hours = minutes as f64 / 60.0,
                        "mega-cluster exceeds the daily budget; kept whole on an over-capacity day"
                    );
                    seed(&mut plans[day], cluster, &cluster.name, &mut placed, &cost);
                    plans[day].route.over_capacity = true;
                    day += 1;
                }
                OversizedClusterPolicy::Overflow => {
                    let mut members = cluster.members.iter().peekable();
                    let mut part = 1;
                    while day < plans.len() {
                        let Some(&first) = members.peek() else { break };
                        if !fits(0, cost(first)) {
                            // A single visit longer than a whole day.
                            break;
                        }
                        let plan = &mut plans[day];
                        plan.route.name = format!("{} (part {})", cluster.name, part);
                        plan.seeded = true;
                        while let Some(&id) = members.peek() {
                            let c = cost(id);
                            if !fits(plan.minutes, c) {
                                break;
                            }
                            plan.push(id.clone(), c);
                            placed.insert(id.clone());
                            members.next();
                        }
                        warn!(cluster = %cluster.id, day = day + 1, part, "oversized mega-cluster split across days");
                        part += 1;
                        day += 1;
                    }
                }
            }
        }

        // Everything not seeded: members of every cluster in cluster order,
        // then any located client the clusters did not cover.
        let mut seen: HashSet<&ClientId> = HashSet::new();
        let mut pool: Vec<ClientId> = Vec::new();
        for id in clusters.iter().flat_map(|cluster| cluster.members.iter()) {
            if seen.insert(id) && !placed.contains(id) && catalog.location_of(id).is_some() {
                pool.push(id.clone());
            }
        }
        for client in catalog.located() {
            if seen.insert(&client.id) && !placed.contains(&client.id) {
                pool.push(client.id.clone());
            }
        }

        let mut unassigned: Vec<UnassignedClient> = catalog
            .clients()
            .iter()
            .filter(|client| client.location.is_none())
            .map(|client| UnassignedClient {
                client: client.id.clone(),
                reason: UnassignedReason::MissingLocation,
            })
            .collect();

        // Even quota over the unseeded days, never past the budget.
        let open: Vec<usize> = (0..plans.len()).filter(|&i| !plans[i].seeded).collect();
        let mut cursor = 0;
        if !open.is_empty() && !pool.is_empty() {
            let quota = pool.len().div_ceil(open.len());
            for &i in &open {
                let plan = &mut plans[i];
                let mut taken = 0;
                while cursor < pool.len() && taken < quota {
                    let c = cost(&pool[cursor]);
                    if !fits(plan.minutes, c) {
                        break;
                    }
                    plan.push(pool[cursor].clone(), c);
                    cursor += 1;
                    taken += 1;
                }
                if taken > 0 {
                    plan.route.name = format!("Mixed route {}", plan.route.day.number());
                }
            }
        }

        // Whatever is left goes to the first day with room.
        for id in pool.drain(cursor..) {
            let c = cost(&id);
            match plans
                .iter_mut()
                .find(|plan| !plan.route.over_capacity && fits(plan.minutes, c))
            {
                Some(plan) => {
                    debug!(client = %id, day = plan.route.day.number(), "client placed in residual capacity");
                    plan.push(id, c);
                }
                None => unassigned.push(UnassignedClient {
                    client: id,
                    reason: UnassignedReason::ExceedsCapacity,
                }),
            }
        }

        let routes: Vec<Route> = plans
            .into_iter()
            .map(|plan| {
                let mut route = plan.route;
                route.estimated_hours = route::estimate_hours(
                    route.stops.iter().map(|id| (cost(id) - overhead) as u32),
                    overhead as u32,
                );
                route.efficiency = route::efficiency(route.stops.len(), route.estimated_hours);
                route
            })
            .collect();

        let short = unassigned
            .iter()
            .filter(|u| u.reason == UnassignedReason::ExceedsCapacity)
            .count();
        if short > 0 {
            warn!(clients = short, "not every client fits in the available day capacity");
        }
        info!(
            routes = routes.len(),
            assigned = routes.iter().map(Route::len).sum::<usize>(),
            unassigned = unassigned.len(),
            "day assignment finished"
        );

        Assignment { routes, unassigned }
    }
}

fn seed(
    plan: &mut DayPlan,
    cluster: &Cluster,
    name: &str,
    placed: &mut HashSet<ClientId>,
    cost: &impl Fn(&ClientId) -> u64,
) {
    plan.route.name = name.to_string();
    plan.seeded = true;
    for id in &cluster.members {
        plan.push(id.clone(), cost(id));
        placed.insert(id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClientRecord;
    use crate::cluster::ClusterDetector;

    fn record(id: &str, lat: f64, lng: f64, minutes: u32) -> ClientRecord {
        ClientRecord {
            id: Some(id.to_string()),
            latitude: Some(lat),
            longitude: Some(lng),
            visit_minutes: Some(minutes),
            ..Default::default()
        }
    }

    /// `n` clients packed within a few hundred meters around `(lat, lng)`.
    fn group(prefix: &str, n: usize, lat: f64, lng: f64, minutes: u32) -> Vec<ClientRecord> {
        (0..n)
            .map(|i| record(&format!("{}{}", prefix, i), lat + i as f64 * 0.001, lng, minutes))
            .collect()
    }

    fn run(records: Vec<ClientRecord>, settings: &OptimizationSettings) -> Assignment {
        let (catalog, _) = ClientCatalog::load(records, settings.depot, settings.visit_duration_minutes);
        let clusters = ClusterDetector::new(settings.cluster.clone()).detect(&catalog, settings.depot);
        DayAssigner.assign(&catalog, &clusters, settings, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn test_one_route_per_day_even_when_empty() {
        let settings = OptimizationSettings::default();
        let assignment = run(Vec::new(), &settings);
        assert_eq!(assignment.routes.len(), 5);
        assert!(assignment.routes.iter().all(Route::is_empty));
        assert_eq!(assignment.routes[4].day, WorkDay::Thursday);
    }

    #[test]
    fn test_higher_priority_cluster_seeds_first_day() {
        let mut records = group("small", 5, 32.60, 35.20, 15);
        records.extend(group("big", 8, 32.90, 35.60, 15));
        let settings = OptimizationSettings::default();

        let assignment = run(records, &settings);

        assert!(assignment.routes[0].stops.iter().all(|id| id.0.starts_with("big")));
        assert_eq!(assignment.routes[0].len(), 8);
        assert!(assignment.routes[1].stops.iter().all(|id| id.0.starts_with("small")));
        assert!(assignment.unassigned.is_empty());
    }

    #[test]
    fn test_priority_ties_broken_by_cluster_id() {
        let mut records = group("first", 5, 32.60, 35.20, 15);
        records.extend(group("second", 5, 32.90, 35.60, 15));
        let settings = OptimizationSettings::default();

        let assignment = run(records, &settings);

        assert!(assignment.routes[0].stops[0].0.starts_with("first"));
        assert!(assignment.routes[1].stops[0].0.starts_with("second"));
    }

    #[test]
    fn test_oversized_cluster_dissolves_by_default() {
        // 6 visits of 2h + 10 min overhead = 13h > 12h budget.
        let records = group("huge", 6, 32.60, 35.20, 120);
        let settings = OptimizationSettings::default();

        let assignment = run(records, &settings);

        assert!(assignment.routes.iter().all(|r| !r.over_capacity));
        assert!(assignment.unassigned.is_empty());
        assert_eq!(assignment.assigned_count(), 6);
        for route in &assignment.routes {
            assert!(route.estimated_hours <= settings.max_hours_per_day);
        }
    }

    #[test]
    fn test_oversized_cluster_kept_whole_is_flagged() {
        let records = group("huge", 6, 32.60, 35.20, 120);
        let settings = OptimizationSettings {
            oversized_cluster_policy: OversizedClusterPolicy::KeepWhole,
            ..Default::default()
        };

        let assignment = run(records, &settings);

        let first = &assignment.routes[0];
        assert!(first.over_capacity);
        assert_eq!(first.len(), 6);
        assert!(first.estimated_hours > settings.max_hours_per_day);
        assert!(assignment.routes[1..].iter().all(|r| !r.over_capacity && r.is_empty()));
    }

    #[test]
    fn test_oversized_cluster_overflows_into_next_day() {
        let records = group("huge", 6, 32.60, 35.20, 120);
        let settings = OptimizationSettings {
            oversized_cluster_policy: OversizedClusterPolicy::Overflow,
            ..Default::default()
        };

        let assignment = run(records, &settings);

        // 130 minutes per stop: five fit in 720 minutes.
        assert_eq!(assignment.routes[0].len(), 5);
        assert_eq!(assignment.routes[1].len(), 1);
        assert!(assignment.routes[0].name.ends_with("(part 1)"));
        assert!(assignment.routes[1].name.ends_with("(part 2)"));
        assert!(assignment.routes.iter().all(|r| r.estimated_hours <= 12.0));
    }

    #[test]
    fn test_missing_location_reported() {
        let mut records = group("ok", 2, 32.60, 35.20, 15);
        records.push(ClientRecord {
            id: Some("nowhere".to_string()),
            ..Default::default()
        });
        let settings = OptimizationSettings::default();

        let assignment = run(records, &settings);

        assert_eq!(
            assignment.unassigned,
            vec![UnassignedClient {
                client: ClientId::new("nowhere"),
                reason: UnassignedReason::MissingLocation,
            }]
        );
        assert!(assignment.capacity_error().is_none());
    }

    #[test]
    fn test_over_capacity_reports_unassigned() {
        // 20 scattered clients of 3h each: 4 per day fits (4 * 190 = 760 > 720),
        // so only 3 per day, 15 total.
        let records: Vec<ClientRecord> = (0..20)
            .map(|i| record(&format!("c{}", i), 31.0 + i as f64 * 0.1, 35.0, 180))
            .collect();
        let settings = OptimizationSettings::default();

        let assignment = run(records, &settings);

        assert_eq!(assignment.assigned_count(), 15);
        assert_eq!(assignment.unassigned.len(), 5);
        match assignment.capacity_error() {
            Some(PlanningError::Capacity { unassigned }) => assert_eq!(unassigned.len(), 5),
            other => panic!("expected capacity error, got {:?}", other),
        }
        for route in &assignment.routes {
            assert!(route.estimated_hours <= settings.max_hours_per_day);
        }
    }

    #[test]
    fn test_each_client_in_at_most_one_route() {
        let mut records = group("a", 7, 32.60, 35.20, 15);
        records.extend(group("b", 5, 32.90, 35.60, 20));
        records.extend((0..9).map(|i| record(&format!("s{}", i), 31.5 + i as f64 * 0.2, 34.9, 30)));
        let settings = OptimizationSettings::default();

        let assignment = run(records, &settings);

        let mut all: Vec<&ClientId> = assignment.routes.iter().flat_map(|r| r.stops.iter()).collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
        assert_eq!(total + assignment.unassigned.len(), 21);
    }

    #[test]
    fn test_fewer_days_per_week() {
        let settings = OptimizationSettings {
            max_days_per_week: 3,
            ..Default::default()
        };
        let assignment = run(group("a", 3, 32.6, 35.2, 15), &settings);
        assert_eq!(assignment.routes.len(), 3);
    }

    #[test]
    fn test_route_metrics() {
        let settings = OptimizationSettings {
            travel_overhead_minutes: 0,
            ..Default::default()
        };
        let assignment = run(group("a", 6, 32.6, 35.2, 15), &settings);
        assert_eq!(assignment.routes[0].estimated_hours, 1.5);
        assert_eq!(assignment.routes[0].efficiency, 4.0);
    }

    #[test]
    fn test_strategy_for_algorithm() {
        assert_eq!(strategy_for(Algorithm::MegaClusterFirst).name(), "mega-cluster-first");
    }
}
