//! Test fixtures for day-route-planner.
//!
//! Provides realistic test data including:
//! - Real Jezreel Valley / Lower Galilee locations
//! - Builders for client records and a fixed clock

#![allow(dead_code)]

pub mod galilee_locations;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use day_route_planner::ClientRecord;
use day_route_planner::catalog::Priority;
use day_route_planner::traits::Clock;

pub use galilee_locations::*;

/// Builder over [`ClientRecord`].
pub struct ClientBuilder {
    record: ClientRecord,
}

impl ClientBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            record: ClientRecord {
                id: Some(id.to_string()),
                name: Some(format!("Client {}", id)),
                ..Default::default()
            },
        }
    }

    pub fn at(mut self, location: &Location) -> Self {
        self.record.latitude = Some(location.lat);
        self.record.longitude = Some(location.lng);
        self.record.address = Some(location.name.to_string());
        self
    }

    pub fn visit(mut self, minutes: u32) -> Self {
        self.record.visit_minutes = Some(minutes);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.record.priority = Some(priority);
        self
    }

    pub fn build(self) -> ClientRecord {
        self.record
    }
}

/// One record per location, ids `<prefix>-<n>`.
pub fn clients_at(prefix: &str, locations: &[Location]) -> Vec<ClientRecord> {
    locations
        .iter()
        .enumerate()
        .map(|(i, location)| ClientBuilder::new(&format!("{}-{}", prefix, i + 1)).at(location).build())
        .collect()
}

/// Six tight Afula clients followed by six outlying singletons.
pub fn afula_and_outliers() -> Vec<ClientRecord> {
    let mut records = clients_at("afula", AFULA);
    records.extend(clients_at("town", OUTLYING));
    records
}

/// A clock that only moves when told to.
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn new() -> Arc<Self> {
        let start = Utc.with_ymd_and_hms(2024, 3, 3, 6, 0, 0).single().unwrap_or_default();
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.0.lock().unwrap() += TimeDelta::minutes(minutes);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
