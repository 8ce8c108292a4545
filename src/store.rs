//! Persistence of settings, optimization history and completed-route results.
//!
//! Everything is stored as JSON strings under fixed keys of a
//! [`KeyValueStore`]; [`MemoryStore`] keeps them in process.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{ClientId, WorkDay};
use crate::cluster::ClusterId;
use crate::error::StoreError;
use crate::route::RouteId;
use crate::settings::{Algorithm, OptimizationSettings};
use crate::traits::{KeyValueStore, PlanningRepository};

/// Optimizations kept in history; older entries are dropped.
pub const HISTORY_LIMIT: usize = 10;

const SETTINGS_KEY: &str = "settings";
const HISTORY_KEY: &str = "optimization_history";
const RESULTS_KEY: &str = "route_results";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub id: RouteId,
    pub day: WorkDay,
    pub name: String,
    pub clients: usize,
    pub estimated_hours: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub name: String,
    pub size: usize,
    pub efficiency: f64,
}

/// One entry of the optimization history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub algorithm: Algorithm,
    pub total_clients: usize,
    pub routes: Vec<RouteSummary>,
    pub mega_clusters: Vec<ClusterSummary>,
    pub unassigned: Vec<ClientId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRouteResult {
    pub route_id: RouteId,
    pub name: String,
    pub day: WorkDay,
    pub clients: usize,
    pub visited: usize,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub efficiency: f64,
    pub completed_at: DateTime<Utc>,
}

/// [`PlanningRepository`] on top of any string key-value store.
#[derive(Debug)]
pub struct KeyValueRepository<S> {
    store: S,
    history_limit: usize,
}

impl<S: KeyValueStore> KeyValueRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            history_limit: HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        debug!(key, bytes = raw.len(), "writing store entry");
        self.store.set(key, raw)
    }
}

impl<S: KeyValueStore> PlanningRepository for KeyValueRepository<S> {
    fn load_settings(&self) -> Result<Option<OptimizationSettings>, StoreError> {
        self.read(SETTINGS_KEY)
    }

    fn save_settings(&self, settings: &OptimizationSettings) -> Result<(), StoreError> {
        self.write(SETTINGS_KEY, settings)
    }

    fn append_history(&self, record: OptimizationRecord) -> Result<(), StoreError> {
        let mut history: Vec<OptimizationRecord> = self.read(HISTORY_KEY)?.unwrap_or_default();
        history.insert(0, record);
        history.truncate(self.history_limit);
        self.write(HISTORY_KEY, &history)
    }

    fn history(&self) -> Result<Vec<OptimizationRecord>, StoreError> {
        Ok(self.read(HISTORY_KEY)?.unwrap_or_default())
    }

    fn append_result(&self, result: CompletedRouteResult) -> Result<(), StoreError> {
        let mut results: Vec<CompletedRouteResult> = self.read(RESULTS_KEY)?.unwrap_or_default();
        results.push(result);
        self.write(RESULTS_KEY, &results)
    }

    fn results(&self) -> Result<Vec<CompletedRouteResult>, StoreError> {
        Ok(self.read(RESULTS_KEY)?.unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(revision: u64) -> OptimizationRecord {
        OptimizationRecord {
            revision,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            algorithm: Algorithm::MegaClusterFirst,
            total_clients: 0,
            routes: Vec::new(),
            mega_clusters: Vec::new(),
            unassigned: Vec::new(),
        }
    }

    #[test]
    fn test_settings_round_trip() {
        let repo = KeyValueRepository::new(MemoryStore::new());
        assert!(repo.load_settings().unwrap().is_none());

        let settings = OptimizationSettings {
            max_hours_per_day: 8.0,
            ..Default::default()
        };
        repo.save_settings(&settings).unwrap();
        assert_eq!(repo.load_settings().unwrap(), Some(settings));
    }

    #[test]
    fn test_history_keeps_most_recent() {
        let repo = KeyValueRepository::new(MemoryStore::new());
        for revision in 1..=12 {
            repo.append_history(record(revision)).unwrap();
        }
        let history = repo.history().unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].revision, 12);
        assert_eq!(history[9].revision, 3);
    }

    #[test]
    fn test_results_append() {
        let repo = KeyValueRepository::new(MemoryStore::new());
        let result = CompletedRouteResult {
            route_id: RouteId::for_day(WorkDay::Sunday),
            name: "Afula".to_string(),
            day: WorkDay::Sunday,
            clients: 6,
            visited: 6,
            estimated_hours: 2.5,
            actual_hours: 3.25,
            efficiency: 2.4,
            completed_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        repo.append_result(result.clone()).unwrap();
        repo.append_result(result.clone()).unwrap();
        assert_eq!(repo.results().unwrap(), vec![result.clone(), result]);
    }

    #[test]
    fn test_corrupt_entry_reports_key() {
        let store = MemoryStore::new();
        store.set(SETTINGS_KEY, "{not json".to_string()).unwrap();
        let repo = KeyValueRepository::new(store);
        match repo.load_settings() {
            Err(StoreError::Serialization { key, .. }) => assert_eq!(key, SETTINGS_KEY),
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let store = MemoryStore::new();
        store
            .set(SETTINGS_KEY, r#"{"max_hours_per_day": 9.5}"#.to_string())
            .unwrap();
        let repo = KeyValueRepository::new(store);
        let settings = repo.load_settings().unwrap().unwrap();
        assert_eq!(settings.max_hours_per_day, 9.5);
        assert_eq!(settings.visit_duration_minutes, 15);
    }
}
