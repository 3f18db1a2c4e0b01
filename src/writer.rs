//! Ordered write sequence for one resolved event.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::infra::operators::OperatorTable;
use crate::location::ResolvedLocation;
use crate::payload::VehicleEvent;
use crate::status::VehicleStatus;
use crate::store::{NewBusStatus, NewStop, Store, StoreError};
use crate::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored { stop_id: i64, status_id: i64 },
    /// Bus and stop rows were written but the status row was not, because
    /// one of its parents could not be found afterwards.
    Skipped { stop_id: i64 },
}

/// Writes buses, stop events, stops and status rows.
///
/// Each step commits on its own. If a later step fails the earlier rows stay,
/// which is harmless: the bus upsert is idempotent and stop rows are an
/// append-only log.
pub struct PersistenceWriter {
    store: Arc<dyn Store>,
    operators: OperatorTable,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn Store>, operators: OperatorTable) -> Self {
        Self { store, operators }
    }

    pub async fn write(
        &self,
        topic: &Topic,
        event: &VehicleEvent,
        status: VehicleStatus,
        location: &ResolvedLocation,
    ) -> Result<WriteOutcome, StoreError> {
        let vehicle_number = topic.vehicle_number;

        let operator = self.operators.name(event.operator_code);
        self.store.upsert_bus(vehicle_number, operator).await?;

        if let Some(stop_event) = event.stop_event_id {
            self.store
                .upsert_stop_event(stop_event, status.label(), event.arrival_time)
                .await?;
        }

        let stop_id = self
            .store
            .insert_stop(&NewStop {
                tsi: event.tsi,
                stop_event: event.stop_event_id,
                stop_name: location.stop_name.clone(),
                stop_address: location.stop_address.clone(),
                latitude: location.stop_coordinates.latitude,
                longitude: location.stop_coordinates.longitude,
            })
            .await?;

        let bus_exists = self.store.bus_exists(vehicle_number).await?;
        let stop_exists = self.store.stop_exists(stop_id).await?;
        if !bus_exists || !stop_exists {
            warn!(
                vehicle_number,
                stop_id,
                bus_exists,
                stop_exists,
                "Parent row missing, skipping bus status insert"
            );
            return Ok(WriteOutcome::Skipped { stop_id });
        }

        let status_id = self
            .store
            .insert_bus_status(&NewBusStatus {
                vehicle_number,
                tsi: event.tsi,
                utc_timestamp: event.timestamp,
                route_number: event.route_label.clone(),
                current_location: location.current_address.clone(),
                latitude: event.coordinates.map(|c| c.latitude),
                longitude: event.coordinates.map(|c| c.longitude),
                stop_id,
                destination: topic.destination.clone(),
            })
            .await?;

        debug!(vehicle_number, stop_id, status_id, "Bus status stored");
        Ok(WriteOutcome::Stored { stop_id, status_id })
    }

    /// Drops the status history of a vehicle whose trip has ended.
    pub async fn end_trip(&self, vehicle_number: i32) -> Result<u64, StoreError> {
        self.store.delete_bus_statuses(vehicle_number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Coordinates, LocationSource};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveTime;

    /// Reports chosen parent rows as missing while delegating writes.
    struct MissingParents {
        inner: MemoryStore,
        bus_gone: bool,
        stop_gone: bool,
    }

    #[async_trait]
    impl Store for MissingParents {
        async fn upsert_bus(&self, v: i32, operator: &str) -> Result<(), StoreError> {
            self.inner.upsert_bus(v, operator).await
        }
        async fn upsert_stop_event(
            &self,
            id: i64,
            status: &str,
            arrival_time: Option<NaiveTime>,
        ) -> Result<(), StoreError> {
            self.inner.upsert_stop_event(id, status, arrival_time).await
        }
        async fn insert_stop(&self, stop: &NewStop) -> Result<i64, StoreError> {
            self.inner.insert_stop(stop).await
        }
        async fn bus_exists(&self, v: i32) -> Result<bool, StoreError> {
            Ok(!self.bus_gone && self.inner.bus_exists(v).await?)
        }
        async fn stop_exists(&self, id: i64) -> Result<bool, StoreError> {
            Ok(!self.stop_gone && self.inner.stop_exists(id).await?)
        }
        async fn insert_bus_status(&self, s: &NewBusStatus) -> Result<i64, StoreError> {
            self.inner.insert_bus_status(s).await
        }
        async fn delete_bus_statuses(&self, v: i32) -> Result<u64, StoreError> {
            self.inner.delete_bus_statuses(v).await
        }
        async fn last_known_location(
            &self,
            v: i32,
            unresolved: &str,
        ) -> Result<Option<String>, StoreError> {
            self.inner.last_known_location(v, unresolved).await
        }
        async fn truncate_all(&self) -> Result<(), StoreError> {
            self.inner.truncate_all().await
        }
    }

    fn topic(vehicle_number: i32) -> Topic {
        Topic {
            event_type: "vp".into(),
            route_id: "0012".into(),
            vehicle_number,
            destination: "Kamppi".into(),
            next_stop: "1234".into(),
            start_time: "10:00".into(),
        }
    }

    fn event(operator_code: i64, stop_event_id: Option<i64>) -> VehicleEvent {
        VehicleEvent {
            timestamp: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            tsi: 100,
            operator_code,
            vehicle: 1000,
            coordinates: Some(Coordinates {
                latitude: 60.17,
                longitude: 24.94,
            }),
            source: LocationSource::Gps,
            route_label: Some("55".into()),
            stop_event_id,
            arrival_time: NaiveTime::from_hms_opt(10, 5, 0),
        }
    }

    fn location() -> ResolvedLocation {
        ResolvedLocation {
            stop_name: "Kamppi".into(),
            stop_address: Some("Kampinkuja, Kamppi, Eteläinen suurpiiri".into()),
            stop_coordinates: Coordinates {
                latitude: 60.169,
                longitude: 24.931,
            },
            current_address: "5, Mannerheimintie, Kluuvi, Helsinki".into(),
        }
    }

    fn writer() -> (PersistenceWriter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let operators = OperatorTable::from_entries([
            (12, "Helsingin Bussiliikenne Oy".to_string()),
            (22, "Nobina Finland Oy".to_string()),
        ]);
        (PersistenceWriter::new(store.clone(), operators), store)
    }

    #[tokio::test]
    async fn test_write_links_status_to_new_stop() {
        let (writer, store) = writer();

        let outcome = writer
            .write(&topic(1000), &event(12, Some(5)), VehicleStatus::Arriving, &location())
            .await
            .unwrap();

        let WriteOutcome::Stored { stop_id, .. } = outcome else {
            panic!("expected stored, got {outcome:?}");
        };
        assert_eq!(store.operator(1000).as_deref(), Some("Helsingin Bussiliikenne Oy"));

        let stop_event = store.stop_event(5).unwrap();
        assert_eq!(stop_event.status, "Arriving to a stop");
        assert_eq!(stop_event.arrival_time, NaiveTime::from_hms_opt(10, 5, 0));

        let statuses = store.bus_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status.stop_id, stop_id);
        assert_eq!(statuses[0].status.route_number.as_deref(), Some("55"));
        assert_eq!(statuses[0].status.destination, "Kamppi");
    }

    #[tokio::test]
    async fn test_operator_is_last_write_wins() {
        let (writer, store) = writer();

        writer
            .write(&topic(1000), &event(12, None), VehicleStatus::Driving, &location())
            .await
            .unwrap();
        writer
            .write(&topic(1000), &event(22, None), VehicleStatus::Driving, &location())
            .await
            .unwrap();

        assert_eq!(store.operator(1000).as_deref(), Some("Nobina Finland Oy"));
        assert_eq!(store.bus_count(), 1);
        assert_eq!(store.stops().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_operator_code() {
        let (writer, store) = writer();

        writer
            .write(&topic(7), &event(999, None), VehicleStatus::Driving, &location())
            .await
            .unwrap();

        assert_eq!(store.operator(7).as_deref(), Some("Unknown"));
    }

    #[tokio::test]
    async fn test_no_stop_event_without_id() {
        let (writer, store) = writer();

        writer
            .write(&topic(7), &event(12, None), VehicleStatus::Driving, &location())
            .await
            .unwrap();

        assert_eq!(store.stop_event(5), None);
        assert_eq!(store.stops()[0].stop.stop_event, None);
    }

    #[tokio::test]
    async fn test_end_trip_removes_only_that_vehicle() {
        let (writer, store) = writer();
        for vehicle in [7, 7, 8] {
            writer
                .write(&topic(vehicle), &event(12, None), VehicleStatus::Driving, &location())
                .await
                .unwrap();
        }

        assert_eq!(writer.end_trip(7).await.unwrap(), 2);
        let remaining = store.bus_statuses();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status.vehicle_number, 8);
    }

    async fn write_with_missing(bus_gone: bool, stop_gone: bool) -> Arc<MissingParents> {
        let store = Arc::new(MissingParents {
            inner: MemoryStore::new(),
            bus_gone,
            stop_gone,
        });
        let writer = PersistenceWriter::new(store.clone(), OperatorTable::default());

        let outcome = writer
            .write(&topic(1000), &event(12, Some(5)), VehicleStatus::Driving, &location())
            .await
            .unwrap();

        let stops = store.inner.stops();
        assert_eq!(stops.len(), 1);
        assert_eq!(outcome, WriteOutcome::Skipped { stop_id: stops[0].id });
        store
    }

    #[tokio::test]
    async fn test_missing_bus_skips_status() {
        let store = write_with_missing(true, false).await;

        assert!(store.inner.bus_statuses().is_empty());
        assert_eq!(store.inner.bus_count(), 1);
        assert!(store.inner.stop_event(5).is_some());
    }

    #[tokio::test]
    async fn test_missing_stop_skips_status() {
        let store = write_with_missing(false, true).await;

        assert!(store.inner.bus_statuses().is_empty());
        assert_eq!(store.inner.stops()[0].stop.stop_name, "Kamppi");
    }
}
