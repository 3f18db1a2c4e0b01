//! JSON payload decoder for HFP events.
//!
//! Payloads wrap the event in an object keyed by the upper-cased event type,
//! e.g. `{"VP": {"tst": "...", "lat": 60.17, ...}}`.

use chrono::{DateTime, NaiveTime, Timelike};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::IngestError;
use crate::status::VehicleStatus;

/// Where the reported position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Gps,
    Manual,
    Odometer,
    Unavailable,
}

impl LocationSource {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("GPS") => Self::Gps,
            Some("MAN") => Self::Manual,
            Some("ODO") => Self::Odometer,
            _ => Self::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct RawEvent {
    tst: String,
    tsi: i64,
    oper: i64,
    veh: i32,
    lat: Option<f64>,
    long: Option<f64>,
    loc: Option<String>,
    desi: Option<String>,
    stop: Option<i64>,
    ttarr: Option<String>,
}

/// The fields of one event that the pipeline uses.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleEvent {
    /// Time of day of the sample, whole seconds.
    pub timestamp: NaiveTime,
    pub tsi: i64,
    pub operator_code: i64,
    pub vehicle: i32,
    pub coordinates: Option<Coordinates>,
    pub source: LocationSource,
    pub route_label: Option<String>,
    pub stop_event_id: Option<i64>,
    pub arrival_time: Option<NaiveTime>,
}

/// Decodes the inner event object for `event_type` from `bytes`.
///
/// # Errors
///
/// Returns [`IngestError::MalformedMessage`] if the payload is not JSON, lacks
/// the event-type key, misses a required field, or carries an unparseable
/// timestamp.
pub fn parse_event(
    bytes: &[u8],
    event_type: &str,
    status: VehicleStatus,
) -> Result<VehicleEvent, IngestError> {
    let mut outer: HashMap<String, Value> = serde_json::from_slice(bytes)
        .map_err(|e| IngestError::MalformedMessage(format!("payload is not a JSON object: {e}")))?;

    let key = event_type.to_uppercase();
    let inner = outer.remove(&key).ok_or_else(|| {
        IngestError::MalformedMessage(format!("payload has no '{key}' object"))
    })?;

    let raw: RawEvent = serde_json::from_value(inner)
        .map_err(|e| IngestError::MalformedMessage(format!("invalid '{key}' event: {e}")))?;

    let timestamp = time_of_day(&raw.tst)?;
    let arrival_time = match (&raw.ttarr, status.needs_arrival_time()) {
        (Some(ttarr), true) => Some(time_of_day(ttarr)?),
        _ => None,
    };

    let coordinates = match (raw.lat, raw.long) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(VehicleEvent {
        timestamp,
        tsi: raw.tsi,
        operator_code: raw.oper,
        vehicle: raw.veh,
        coordinates,
        source: LocationSource::from_tag(raw.loc.as_deref()),
        route_label: raw.desi,
        stop_event_id: raw.stop,
        arrival_time,
    })
}

/// Parses an RFC 3339 UTC timestamp and keeps only the time of day, dropping
/// sub-second precision.
fn time_of_day(value: &str) -> Result<NaiveTime, IngestError> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| IngestError::MalformedMessage(format!("bad timestamp '{value}': {e}")))?;

    parsed
        .naive_utc()
        .time()
        .with_nanosecond(0)
        .ok_or_else(|| IngestError::MalformedMessage(format!("bad timestamp '{value}'")))
}
