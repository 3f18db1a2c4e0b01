use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{NewBusStatus, NewStop, Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct StopEventRow {
    pub status: String,
    pub arrival_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopRow {
    pub id: i64,
    pub stop: NewStop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusStatusRow {
    pub id: i64,
    pub status: NewBusStatus,
}

#[derive(Default)]
struct Tables {
    buses: BTreeMap<i32, String>,
    stop_events: BTreeMap<i64, StopEventRow>,
    stops: Vec<StopRow>,
    bus_statuses: Vec<BusStatusRow>,
    next_stop_id: i64,
    next_status_id: i64,
}

/// In-process [`Store`] that enforces the same foreign keys and cascades as
/// the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn operator(&self, vehicle_number: i32) -> Option<String> {
        self.tables().buses.get(&vehicle_number).cloned()
    }

    pub fn bus_count(&self) -> usize {
        self.tables().buses.len()
    }

    pub fn stop_event(&self, id: i64) -> Option<StopEventRow> {
        self.tables().stop_events.get(&id).cloned()
    }

    pub fn stops(&self) -> Vec<StopRow> {
        self.tables().stops.clone()
    }

    pub fn bus_statuses(&self) -> Vec<BusStatusRow> {
        self.tables().bus_statuses.clone()
    }

    /// `true` when no table holds any row.
    pub fn is_empty(&self) -> bool {
        let t = self.tables();
        t.buses.is_empty()
            && t.stop_events.is_empty()
            && t.stops.is_empty()
            && t.bus_statuses.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_bus(&self, vehicle_number: i32, operator: &str) -> Result<(), StoreError> {
        self.tables()
            .buses
            .insert(vehicle_number, operator.to_string());
        Ok(())
    }

    async fn upsert_stop_event(
        &self,
        id: i64,
        status: &str,
        arrival_time: Option<NaiveTime>,
    ) -> Result<(), StoreError> {
        self.tables().stop_events.insert(
            id,
            StopEventRow {
                status: status.to_string(),
                arrival_time,
            },
        );
        Ok(())
    }

    async fn insert_stop(&self, stop: &NewStop) -> Result<i64, StoreError> {
        let mut t = self.tables();
        if let Some(event) = stop.stop_event {
            if !t.stop_events.contains_key(&event) {
                return Err(StoreError::MissingRow {
                    table: "stop_event",
                    key: event.to_string(),
                });
            }
        }

        t.next_stop_id += 1;
        let id = t.next_stop_id;
        t.stops.push(StopRow {
            id,
            stop: stop.clone(),
        });
        Ok(id)
    }

    async fn bus_exists(&self, vehicle_number: i32) -> Result<bool, StoreError> {
        Ok(self.tables().buses.contains_key(&vehicle_number))
    }

    async fn stop_exists(&self, stop_id: i64) -> Result<bool, StoreError> {
        Ok(self.tables().stops.iter().any(|s| s.id == stop_id))
    }

    async fn insert_bus_status(&self, status: &NewBusStatus) -> Result<i64, StoreError> {
        let mut t = self.tables();
        if !t.buses.contains_key(&status.vehicle_number) {
            return Err(StoreError::MissingRow {
                table: "bus",
                key: status.vehicle_number.to_string(),
            });
        }
        if !t.stops.iter().any(|s| s.id == status.stop_id) {
            return Err(StoreError::MissingRow {
                table: "stop",
                key: status.stop_id.to_string(),
            });
        }

        t.next_status_id += 1;
        let id = t.next_status_id;
        t.bus_statuses.push(BusStatusRow {
            id,
            status: status.clone(),
        });
        Ok(id)
    }

    async fn delete_bus_statuses(&self, vehicle_number: i32) -> Result<u64, StoreError> {
        let mut t = self.tables();
        let before = t.bus_statuses.len();
        t.bus_statuses
            .retain(|row| row.status.vehicle_number != vehicle_number);
        Ok((before - t.bus_statuses.len()) as u64)
    }

    async fn last_known_location(
        &self,
        vehicle_number: i32,
        unresolved: &str,
    ) -> Result<Option<String>, StoreError> {
        let t = self.tables();
        let location = t
            .bus_statuses
            .iter()
            .filter(|row| {
                row.status.vehicle_number == vehicle_number
                    && row.status.current_location != unresolved
            })
            .max_by_key(|row| (row.status.tsi, row.id))
            .map(|row| row.status.current_location.clone());
        Ok(location)
    }

    async fn truncate_all(&self) -> Result<(), StoreError> {
        let mut t = self.tables();
        t.bus_statuses.clear();
        t.stops.clear();
        t.stop_events.clear();
        t.buses.clear();
        Ok(())
    }
}
