//! Relational store for buses, stops, stop events and bus status rows.
//!
//! [`Store`] is the seam between the pipeline and the database. [`PgStore`]
//! is the production implementation; [`MemoryStore`] keeps the same
//! referential rules in memory.

mod memory;
mod postgres;

pub use memory::{BusStatusRow, MemoryStore, StopEventRow, StopRow};
pub use postgres::{PgStore, PoolSettings};

use async_trait::async_trait;
use chrono::NaiveTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{table} row {key} does not exist")]
    MissingRow { table: &'static str, key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStop {
    pub tsi: i64,
    pub stop_event: Option<i64>,
    pub stop_name: String,
    pub stop_address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBusStatus {
    pub vehicle_number: i32,
    pub tsi: i64,
    pub utc_timestamp: NaiveTime,
    pub route_number: Option<String>,
    pub current_location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub stop_id: i64,
    pub destination: String,
}

/// Operations the ingestion pipeline and the cleanup job perform.
///
/// Each call commits on its own; callers sequence them and decide what a
/// failure part-way through means.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts the bus or overwrites its operator.
    async fn upsert_bus(&self, vehicle_number: i32, operator: &str) -> Result<(), StoreError>;

    async fn upsert_stop_event(
        &self,
        id: i64,
        status: &str,
        arrival_time: Option<NaiveTime>,
    ) -> Result<(), StoreError>;

    /// Appends a stop row and returns its id.
    async fn insert_stop(&self, stop: &NewStop) -> Result<i64, StoreError>;

    async fn bus_exists(&self, vehicle_number: i32) -> Result<bool, StoreError>;

    async fn stop_exists(&self, stop_id: i64) -> Result<bool, StoreError>;

    /// Appends a status row and returns its id.
    async fn insert_bus_status(&self, status: &NewBusStatus) -> Result<i64, StoreError>;

    /// Removes every status row of `vehicle_number`, returning how many went.
    async fn delete_bus_statuses(&self, vehicle_number: i32) -> Result<u64, StoreError>;

    /// The vehicle's current location from its highest-`tsi` status row,
    /// skipping rows whose location is `unresolved`.
    async fn last_known_location(
        &self,
        vehicle_number: i32,
        unresolved: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Deletes every row from every table in one transaction.
    async fn truncate_all(&self) -> Result<(), StoreError>;
}
