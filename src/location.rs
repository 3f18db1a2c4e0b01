//! Decides the current address and next-stop details for one event.
//!
//! Address strings are cut out of the geocoder's formatted address by
//! position. That layout is specific to Nominatim's `display_name`
//! (`house number, street, district, …, city, region, county, postcode,
//! country`): the first three segments form the street part and the
//! fifth-from-last segment is the city. Swapping providers means revisiting
//! [`compose_current_address`] and [`compose_stop_address`].

use std::sync::Arc;
use tracing::{debug, warn};

use crate::dedup::{Channel, DuplicateFilter};
use crate::payload::{Coordinates, LocationSource, VehicleEvent};
use crate::services::geocoding::ReverseGeocoder;
use crate::services::stop_lookup::StopLookup;
use crate::status::VehicleStatus;
use crate::store::{Store, StoreError};

/// Stored in place of an address whenever none could be resolved.
pub const UNRESOLVED_ADDRESS: &str = "Undefined";

const UNKNOWN_STOP: Coordinates = Coordinates {
    latitude: 0.0,
    longitude: 0.0,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    /// Empty when the stop is unknown or the vehicle is departing.
    pub stop_name: String,
    pub stop_address: Option<String>,
    /// `(0.0, 0.0)` when the stop lookup failed.
    pub stop_coordinates: Coordinates,
    pub current_address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedLocation),
    /// The position repeats the channel's previous address.
    Duplicate,
}

pub struct LocationResolver {
    stops: Arc<dyn StopLookup>,
    geocoder: Arc<ReverseGeocoder>,
    store: Arc<dyn Store>,
    filter: DuplicateFilter,
}

impl LocationResolver {
    pub fn new(
        stops: Arc<dyn StopLookup>,
        geocoder: Arc<ReverseGeocoder>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            stops,
            geocoder,
            store,
            filter: DuplicateFilter::new(),
        }
    }

    /// Resolves `event`, whose topic named `next_stop` as the upcoming stop.
    ///
    /// # Errors
    ///
    /// Only the store lookup behind the odometer fallback can fail; lookup
    /// and geocoding failures degrade to [`UNRESOLVED_ADDRESS`] and an empty
    /// stop name.
    pub async fn resolve(
        &mut self,
        vehicle_number: i32,
        next_stop: &str,
        event: &VehicleEvent,
        status: VehicleStatus,
    ) -> Result<Resolution, StoreError> {
        let current = match (event.source, event.coordinates) {
            (LocationSource::Unavailable, _) | (_, None) => None,
            (source, Some(at)) => match self.geocoder.resolve(at).await {
                Some(formatted) => {
                    if let Some(channel) = Channel::for_source(source) {
                        if !self.filter.admit(channel, &formatted) {
                            debug!(vehicle_number, ?channel, "Duplicate position");
                            return Ok(Resolution::Duplicate);
                        }
                    }
                    Some(
                        compose_current_address(&formatted)
                            .unwrap_or_else(|| UNRESOLVED_ADDRESS.to_string()),
                    )
                }
                None => Some(UNRESOLVED_ADDRESS.to_string()),
            },
        };

        let (stop_name, stop_coordinates, stop_address) =
            self.next_stop(vehicle_number, next_stop).await;

        let current_address = match current {
            Some(address) => address,
            None if event.source == LocationSource::Odometer => {
                self.dead_reckoned_address(event.vehicle, &stop_name).await?
            }
            None => UNRESOLVED_ADDRESS.to_string(),
        };

        // The status already says the vehicle is leaving; an upcoming stop
        // name would only confuse readers.
        let stop_name = if status == VehicleStatus::Departing {
            String::new()
        } else {
            stop_name
        };

        Ok(Resolution::Resolved(ResolvedLocation {
            stop_name,
            stop_address,
            stop_coordinates,
            current_address,
        }))
    }

    async fn next_stop(
        &self,
        vehicle_number: i32,
        stop_id: &str,
    ) -> (String, Coordinates, Option<String>) {
        let stop = match self.stops.find_stop(stop_id).await {
            Ok(Some(stop)) => stop,
            Ok(None) => {
                warn!(vehicle_number, stop_id, "Stop data is unavailable");
                return (String::new(), UNKNOWN_STOP, None);
            }
            Err(e) => {
                warn!(vehicle_number, stop_id, error = %e, "Stop lookup failed");
                return (String::new(), UNKNOWN_STOP, None);
            }
        };

        let address = self
            .geocoder
            .resolve(stop.coordinates)
            .await
            .and_then(|formatted| compose_stop_address(&formatted));

        (stop.name, stop.coordinates, address)
    }

    /// Odometer positions without coordinates: the stop name, qualified by
    /// the city of the vehicle's last known address when there is one.
    async fn dead_reckoned_address(
        &self,
        vehicle: i32,
        stop_name: &str,
    ) -> Result<String, StoreError> {
        let previous = self
            .store
            .last_known_location(vehicle, UNRESOLVED_ADDRESS)
            .await?;

        Ok(match previous.as_deref().and_then(city_hint) {
            Some(city) => format!("{stop_name}, {city}"),
            None => stop_name.to_string(),
        })
    }
}

/// `"<seg 0>, <seg 1>, <seg 2>, <city>"`, where the city is the
/// fifth-from-last segment and left empty for short addresses. `None` if the
/// address has fewer than three segments.
pub fn compose_current_address(formatted: &str) -> Option<String> {
    let parts: Vec<&str> = formatted.split(", ").collect();
    if parts.len() < 3 {
        return None;
    }

    let city = if parts.len() > 5 {
        parts[parts.len() - 5]
    } else {
        ""
    };
    Some(format!("{}, {}, {}, {}", parts[0], parts[1], parts[2], city))
}

/// The first three segments of the formatted address.
pub fn compose_stop_address(formatted: &str) -> Option<String> {
    let parts: Vec<&str> = formatted.split(", ").collect();
    if parts.len() < 3 {
        return None;
    }
    Some(parts[..3].join(", "))
}

/// Last whitespace-separated word of a previously stored address, taken as
/// its city. Addresses of fewer than three words give no hint.
fn city_hint(previous: &str) -> Option<&str> {
    let words: Vec<&str> = previous.split_whitespace().collect();
    if words.len() >= 3 {
        words.last().copied()
    } else {
        None
    }
}
