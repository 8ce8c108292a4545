//! Proximity clustering of clients.
//!
//! Detection is a greedy single pass in catalog order: each client joins the
//! first cluster whose seed point lies within the radius, otherwise it seeds a
//! new cluster. The pass is order-dependent, and always returns the same
//! partition for the same input order.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Client, ClientCatalog, ClientId};
use crate::geo::{self, Coordinate};
use crate::settings::ClusterSettings;

const DEFAULT_CLUSTER_NAME: &str = "Client group";

/// Cluster identifier, numbered from 1 in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    /// Mean of the final members' coordinates.
    pub centroid: Coordinate,
    pub members: Vec<ClientId>,
    pub total_visit_minutes: u32,
    /// Visits per hour of visit time.
    pub efficiency: f64,
    pub mega: bool,
    pub distance_from_depot_km: f64,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Ranking used to decide which mega-cluster seeds a day first.
    pub fn priority(&self) -> f64 {
        self.efficiency * self.size() as f64
    }
}

/// Accumulates members while the detection pass runs.
struct Seed<'a> {
    point: Coordinate,
    members: Vec<&'a Client>,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterDetector {
    settings: ClusterSettings,
}

impl ClusterDetector {
    pub fn new(settings: ClusterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Partition every located client into clusters.
    ///
    /// Clients without a location are skipped. `depot` is only used to fill in
    /// each cluster's distance from the depot.
    pub fn detect(&self, catalog: &ClientCatalog, depot: Coordinate) -> Vec<Cluster> {
        let mut seeds: Vec<Seed<'_>> = Vec::new();

        for client in catalog.located() {
            let Some(point) = client.location else { continue };
            let joined = seeds
                .iter_mut()
                .find(|seed| geo::distance_km(point, seed.point) <= self.settings.radius_km);
            match joined {
                Some(seed) => seed.members.push(client),
                None => seeds.push(Seed {
                    point,
                    members: vec![client],
                }),
            }
        }

        let clusters: Vec<Cluster> = seeds
            .into_iter()
            .enumerate()
            .map(|(i, seed)| self.finish(ClusterId(i as u32 + 1), seed, depot))
            .collect();

        let mega = clusters.iter().filter(|cluster| cluster.mega).count();
        info!(
            clusters = clusters.len(),
            mega,
            radius_km = self.settings.radius_km,
            threshold = self.settings.mega_threshold,
            "cluster detection finished"
        );
        clusters
    }

    /// First cluster whose centroid lies within the radius of `point`; mega
    /// clusters are checked before ordinary ones.
    pub fn locate<'c>(&self, clusters: &'c [Cluster], point: Coordinate) -> Option<&'c Cluster> {
        let within = |cluster: &&Cluster| {
            geo::distance_km(point, cluster.centroid) <= self.settings.radius_km
        };
        clusters
            .iter()
            .filter(|cluster| cluster.mega)
            .find(within)
            .or_else(|| clusters.iter().filter(|cluster| !cluster.mega).find(within))
    }

    fn finish(&self, id: ClusterId, seed: Seed<'_>, depot: Coordinate) -> Cluster {
        let points: Vec<Coordinate> = seed.members.iter().filter_map(|c| c.location).collect();
        let centroid = geo::centroid(&points).unwrap_or(seed.point);
        let total_visit_minutes: u32 = seed.members.iter().map(|c| c.visit_minutes).sum();
        let efficiency = if total_visit_minutes > 0 {
            seed.members.len() as f64 / (total_visit_minutes as f64 / 60.0)
        } else {
            0.0
        };
        let mega = seed.members.len() >= self.settings.mega_threshold;
        let addresses: Vec<&str> = seed
            .members
            .iter()
            .map(|c| c.address.as_str())
            .filter(|address| !address.trim().is_empty())
            .collect();

        debug!(%id, size = seed.members.len(), mega, "cluster formed");

        Cluster {
            id,
            name: cluster_name(&addresses),
            centroid,
            members: seed.members.iter().map(|c| c.id.clone()).collect(),
            total_visit_minutes,
            efficiency,
            mega,
            distance_from_depot_km: geo::distance_km(depot, centroid),
        }
    }
}

/// Name a cluster after its most common address word (longer than three
/// characters, shared by at least two addresses, ties to the word seen first);
/// falls back to the first word of the first address.
fn cluster_name(addresses: &[&str]) -> String {
    let Some(first) = addresses.first() else {
        return DEFAULT_CLUSTER_NAME.to_string();
    };

    // (word, addresses containing it) in first-seen order.
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for address in addresses {
        let mut seen: Vec<&str> = Vec::new();
        for word in address.split_whitespace() {
            if word.chars().count() <= 3 || seen.contains(&word) {
                continue;
            }
            seen.push(word);
            match counts.iter_mut().find(|(known, _)| *known == word) {
                Some((_, count)) => *count += 1,
                None => counts.push((word, 1)),
            }
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for &(word, count) in &counts {
        if count > 1 && best.is_none_or(|(_, top)| count > top) {
            best = Some((word, count));
        }
    }

    best.map(|(word, _)| word)
        .or_else(|| first.split_whitespace().next())
        .unwrap_or(DEFAULT_CLUSTER_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClientRecord;
    use crate::settings::DEFAULT_DEPOT;

    fn record(id: &str, lat: f64, lng: f64, address: &str) -> ClientRecord {
        ClientRecord {
            id: Some(id.to_string()),
            address: Some(address.to_string()),
            latitude: Some(lat),
            longitude: Some(lng),
            ..Default::default()
        }
    }

    fn catalog(records: Vec<ClientRecord>) -> ClientCatalog {
        ClientCatalog::load(records, DEFAULT_DEPOT, 15).0
    }

    #[test]
    fn test_singleton_outlier_is_not_mega() {
        let catalog = catalog(vec![record("a", 32.7, 35.4, "")]);
        let clusters = ClusterDetector::default().detect(&catalog, DEFAULT_DEPOT);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size(), 1);
        assert!(!clusters[0].mega);
        assert_eq!(clusters[0].id, ClusterId(1));
    }

    #[test]
    fn test_first_match_wins_over_nearest() {
        // Seeds 3.0 km apart; the probe is 1.9 km from the first seed and
        // 1.1 km from the second, and must still join the first.
        let a = (32.70, 35.40);
        let b = (32.70 + 3.0 / 111.195, 35.40);
        let probe = (32.70 + 1.9 / 111.195, 35.40);
        let catalog = catalog(vec![
            record("a", a.0, a.1, ""),
            record("b", b.0, b.1, ""),
            record("p", probe.0, probe.1, ""),
        ]);

        let clusters = ClusterDetector::default().detect(&catalog, DEFAULT_DEPOT);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![ClientId::new("a"), ClientId::new("p")]);
        assert_eq!(clusters[1].members, vec![ClientId::new("b")]);
    }

    #[test]
    fn test_centroid_is_member_mean_not_seed() {
        let catalog = catalog(vec![
            record("a", 32.700, 35.400, ""),
            record("b", 32.710, 35.400, ""),
        ]);
        let clusters = ClusterDetector::default().detect(&catalog, DEFAULT_DEPOT);
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].centroid.lat - 32.705).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_and_radius_are_configurable() {
        let records = vec![
            record("a", 32.700, 35.400, ""),
            record("b", 32.705, 35.400, ""),
            record("c", 32.710, 35.400, ""),
        ];
        let catalog = catalog(records);

        let loose = ClusterDetector::new(ClusterSettings {
            radius_km: 2.0,
            mega_threshold: 3,
        });
        let clusters = loose.detect(&catalog, DEFAULT_DEPOT);
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].mega);

        // 0.5 km radius: a and b are ~0.56 km apart.
        let tight = ClusterDetector::new(ClusterSettings {
            radius_km: 0.5,
            mega_threshold: 3,
        });
        let clusters = tight.detect(&catalog, DEFAULT_DEPOT);
        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|c| !c.mega));
    }

    #[test]
    fn test_unlocated_clients_stay_unclustered() {
        let mut missing = record("m", 0.0, 0.0, "");
        missing.latitude = None;
        let catalog = catalog(vec![missing, record("a", 32.7, 35.4, "")]);
        let clusters = ClusterDetector::default().detect(&catalog, DEFAULT_DEPOT);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![ClientId::new("a")]);
    }

    #[test]
    fn test_efficiency_and_priority() {
        let mut records: Vec<ClientRecord> = (0..5)
            .map(|i| record(&format!("c{}", i), 32.7 + i as f64 * 0.001, 35.4, ""))
            .collect();
        records[0].visit_minutes = Some(30);
        let catalog = catalog(records);

        let clusters = ClusterDetector::default().detect(&catalog, DEFAULT_DEPOT);
        let cluster = &clusters[0];
        assert!(cluster.mega);
        assert_eq!(cluster.total_visit_minutes, 90);
        assert!((cluster.efficiency - 5.0 / 1.5).abs() < 1e-9);
        assert!((cluster.priority() - 5.0 * 5.0 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_locate_prefers_mega_clusters() {
        let records: Vec<ClientRecord> = (0..5)
            .map(|i| record(&format!("m{}", i), 32.70 + i as f64 * 0.001, 35.40, ""))
            .chain(std::iter::once(record("far", 32.90, 35.60, "")))
            .collect();
        let catalog = catalog(records);
        let detector = ClusterDetector::default();
        let clusters = detector.detect(&catalog, DEFAULT_DEPOT);

        let hit = detector.locate(&clusters, Coordinate::new(32.701, 35.401)).unwrap();
        assert!(hit.mega);
        let far = detector.locate(&clusters, Coordinate::new(32.90, 35.60)).unwrap();
        assert_eq!(far.members, vec![ClientId::new("far")]);
        assert!(detector.locate(&clusters, Coordinate::new(31.0, 34.8)).is_none());
    }

    #[test]
    fn test_cluster_name_uses_shared_word() {
        assert_eq!(
            cluster_name(&["Main St Afula", "Herzl Afula", "Afula Illit"]),
            "Afula"
        );
        assert_eq!(cluster_name(&["Kibbutz Yifat 12"]), "Kibbutz");
        assert_eq!(cluster_name(&[]), DEFAULT_CLUSTER_NAME);
    }

    #[test]
    fn test_cluster_name_picks_most_common_word() {
        // "Herzl" is shared by two addresses, "Nazareth" by three.
        assert_eq!(
            cluster_name(&[
                "Herzl 4 Afula",
                "Herzl 9 Nazareth",
                "Paulus Nazareth",
                "Nazareth Illit",
            ]),
            "Nazareth"
        );
        // Equal counts go to the word seen first.
        assert_eq!(cluster_name(&["Gefen Tavor", "Tavor Gefen"]), "Gefen");
        // A word repeated inside one address counts once.
        assert_eq!(cluster_name(&["Shaul Shaul Shaul", "Emek Hefer", "Emek Yizre'el"]), "Emek");
        assert_eq!(cluster_name(&["Moshav Nahalal", "Kibbutz Yifat"]), "Moshav");
    }
}
