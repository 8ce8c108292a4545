//! Normalized client catalog.
//!
//! The catalog owns the canonical client list for one data load. Raw records
//! are validated and enriched once; malformed records are reported back as
//! [`InputDataError`]s instead of aborting the load.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cluster::ClusterId;
use crate::error::{InputDataError, InputIssue};
use crate::geo::{self, Coordinate};
use crate::route::RouteId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Working days of the week, Sunday through Thursday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkDay {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
}

impl WorkDay {
    pub const ALL: [WorkDay; 5] = [
        WorkDay::Sunday,
        WorkDay::Monday,
        WorkDay::Tuesday,
        WorkDay::Wednesday,
        WorkDay::Thursday,
    ];

    /// Day number, 1-based.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1..=5 => Some(Self::ALL[(number - 1) as usize]),
            _ => None,
        }
    }
}

impl fmt::Display for WorkDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkDay::Sunday => "sunday",
            WorkDay::Monday => "monday",
            WorkDay::Tuesday => "tuesday",
            WorkDay::Wednesday => "wednesday",
            WorkDay::Thursday => "thursday",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Higher rank means more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
        }
    }
}

/// A client record as it arrives from the data source, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub kind: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub visit_minutes: Option<u32>,
    pub priority: Option<Priority>,
    pub day: Option<WorkDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub address: String,
    /// `None` when the record had no usable coordinates.
    pub location: Option<Coordinate>,
    pub visit_minutes: u32,
    pub priority: Priority,
    pub day: Option<WorkDay>,
    pub cluster: Option<ClusterId>,
    pub route: Option<RouteId>,
    /// Visits per hour for this client alone.
    pub efficiency: f64,
    pub distance_from_depot_km: Option<f64>,
    pub search_text: String,
}

const UNNAMED_CLIENT: &str = "Unnamed client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Day,
    Distance,
    VisitTime,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Summary figures over the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_clients: usize,
    pub located_clients: usize,
    pub total_visit_minutes: u64,
    /// Clients per hour across all visit time.
    pub efficiency: f64,
    pub average_client_efficiency: f64,
    pub day_distribution: BTreeMap<WorkDay, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientCatalog {
    clients: Vec<Client>,
    index: HashMap<ClientId, usize>,
}

impl ClientCatalog {
    /// Validate and enrich raw records.
    ///
    /// Records with a blank or duplicate id are dropped. Records with missing or
    /// out-of-range coordinates are kept without a location so they can still
    /// be reported as unassignable later. Insertion order is preserved.
    pub fn load(
        records: Vec<ClientRecord>,
        depot: Coordinate,
        default_visit_minutes: u32,
    ) -> (Self, Vec<InputDataError>) {
        let normalized: Vec<(Option<Client>, Vec<InputDataError>)> = records
            .into_par_iter()
            .enumerate()
            .map(|(index, record)| normalize(index, record, depot, default_visit_minutes))
            .collect();

        let mut catalog = ClientCatalog::default();
        let mut issues = Vec::new();
        let mut seen: HashSet<ClientId> = HashSet::new();

        for (index, (client, mut record_issues)) in normalized.into_iter().enumerate() {
            issues.append(&mut record_issues);
            let Some(client) = client else { continue };
            if !seen.insert(client.id.clone()) {
                issues.push(InputDataError {
                    index,
                    id: Some(client.id.0.clone()),
                    issue: InputIssue::DuplicateId,
                });
                continue;
            }
            catalog.index.insert(client.id.clone(), catalog.clients.len());
            catalog.clients.push(client);
        }

        if !issues.is_empty() {
            warn!(issues = issues.len(), "client records needed correction on load");
        }
        info!(
            clients = catalog.clients.len(),
            located = catalog.located().count(),
            "client catalog loaded"
        );

        (catalog, issues)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clients in insertion order.
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn get(&self, id: &ClientId) -> Option<&Client> {
        self.index.get(id).map(|&i| &self.clients[i])
    }

    pub fn location_of(&self, id: &ClientId) -> Option<Coordinate> {
        self.get(id).and_then(|client| client.location)
    }

    /// Clients with a usable location, in insertion order.
    pub fn located(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter().filter(|client| client.location.is_some())
    }

    /// Case-insensitive substring search over name, address, phone, notes and
    /// kind.
    pub fn search(&self, query: &str) -> Vec<&Client> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.clients.iter().collect();
        }
        self.clients
            .iter()
            .filter(|client| client.search_text.contains(&needle))
            .collect()
    }

    pub fn by_day(&self, day: WorkDay) -> Vec<&Client> {
        self.clients
            .iter()
            .filter(|client| client.day == Some(day))
            .collect()
    }

    /// Stable sort; clients missing the sort value go last in ascending order.
    pub fn sorted(&self, key: SortKey, order: SortOrder) -> Vec<&Client> {
        let mut sorted: Vec<&Client> = self.clients.iter().collect();
        sorted.sort_by(|a, b| {
            let ordering = match key {
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::Day => day_rank(a.day).cmp(&day_rank(b.day)),
                SortKey::Distance => a
                    .distance_from_depot_km
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.distance_from_depot_km.unwrap_or(f64::INFINITY)),
                SortKey::VisitTime => a.visit_minutes.cmp(&b.visit_minutes),
                SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
            };
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        sorted
    }

    pub fn statistics(&self) -> CatalogStats {
        let total_visit_minutes: u64 = self.clients.iter().map(|c| c.visit_minutes as u64).sum();
        let efficiency = if total_visit_minutes > 0 {
            self.clients.len() as f64 / (total_visit_minutes as f64 / 60.0)
        } else {
            0.0
        };
        let average_client_efficiency = if self.clients.is_empty() {
            0.0
        } else {
            self.clients.iter().map(|c| c.efficiency).sum::<f64>() / self.clients.len() as f64
        };
        let mut day_distribution: BTreeMap<WorkDay, usize> =
            WorkDay::ALL.iter().map(|&day| (day, 0)).collect();
        for client in &self.clients {
            if let Some(day) = client.day {
                *day_distribution.entry(day).or_default() += 1;
            }
        }

        CatalogStats {
            total_clients: self.clients.len(),
            located_clients: self.located().count(),
            total_visit_minutes,
            efficiency,
            average_client_efficiency,
            day_distribution,
        }
    }

    /// Replace every client's cluster back-reference.
    pub(crate) fn set_clusters<'a>(
        &mut self,
        memberships: impl IntoIterator<Item = (&'a ClientId, ClusterId)>,
    ) {
        for client in &mut self.clients {
            client.cluster = None;
        }
        for (id, cluster) in memberships {
            if let Some(&i) = self.index.get(id) {
                self.clients[i].cluster = Some(cluster);
            }
        }
    }

    /// Replace every client's day/route assignment.
    pub(crate) fn set_routes<'a>(
        &mut self,
        assignments: impl IntoIterator<Item = (&'a ClientId, WorkDay, &'a RouteId)>,
    ) {
        for client in &mut self.clients {
            client.day = None;
            client.route = None;
        }
        for (id, day, route) in assignments {
            if let Some(&i) = self.index.get(id) {
                self.clients[i].day = Some(day);
                self.clients[i].route = Some(route.clone());
            }
        }
    }
}

fn day_rank(day: Option<WorkDay>) -> u8 {
    day.map(WorkDay::number).unwrap_or(u8::MAX)
}

fn normalize(
    index: usize,
    record: ClientRecord,
    depot: Coordinate,
    default_visit_minutes: u32,
) -> (Option<Client>, Vec<InputDataError>) {
    let mut issues = Vec::new();

    let id = match record.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => ClientId::new(id),
        _ => {
            issues.push(InputDataError {
                index,
                id: None,
                issue: InputIssue::BlankId,
            });
            return (None, issues);
        }
    };

    let mut report = |issue: InputIssue| {
        issues.push(InputDataError {
            index,
            id: Some(id.0.clone()),
            issue,
        })
    };

    let location = match (record.latitude, record.longitude) {
        (Some(lat), Some(lng)) => {
            let point = Coordinate::new(lat, lng);
            if point.is_valid() {
                Some(point)
            } else {
                report(InputIssue::InvalidCoordinates);
                None
            }
        }
        _ => {
            report(InputIssue::MissingCoordinates);
            None
        }
    };

    let visit_minutes = match record.visit_minutes {
        Some(0) => {
            report(InputIssue::ZeroVisitDuration);
            default_visit_minutes
        }
        Some(minutes) => minutes,
        None => default_visit_minutes,
    };

    let search_text = [
        record.name.as_deref(),
        record.address.as_deref(),
        record.phone.as_deref(),
        record.notes.as_deref(),
        record.kind.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();

    let client = Client {
        name: record
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNNAMED_CLIENT.to_string()),
        address: record.address.unwrap_or_default(),
        distance_from_depot_km: location.map(|point| geo::distance_km(depot, point)),
        location,
        efficiency: 60.0 / visit_minutes as f64,
        visit_minutes,
        priority: record.priority.unwrap_or_default(),
        day: record.day,
        cluster: None,
        route: None,
        search_text,
        id,
    };

    (Some(client), issues)
}
