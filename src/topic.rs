//! Parser for HFP journey topics.
//!
//! Topics have the fixed layout
//! `/hfp/v2/journey/<temporal>/<event_type>/<mode>/<route_id>/<vehicle>/…/<destination>/<start_time>/<next_stop>/…`
//! and every field this crate needs sits at a fixed segment index.

use crate::error::IngestError;

const EVENT_TYPE: usize = 4;
const ROUTE_ID: usize = 6;
const VEHICLE_NUMBER: usize = 7;
const DESTINATION: usize = 10;
const START_TIME: usize = 11;
const NEXT_STOP: usize = 12;

/// Next-stop value the feed sends once a vehicle has reached the end of its line.
pub const END_OF_LINE: &str = "EOL";

/// Typed view over the segments of one journey topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub event_type: String,
    pub route_id: String,
    pub vehicle_number: i32,
    pub destination: String,
    pub next_stop: String,
    pub start_time: String,
}

impl Topic {
    /// Splits `raw` into its segments.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MalformedMessage`] if the topic has fewer
    /// segments than the layout requires or the vehicle segment is not numeric.
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let parts: Vec<&str> = raw.strip_prefix('/').unwrap_or(raw).split('/').collect();

        if parts.len() <= NEXT_STOP {
            return Err(IngestError::MalformedMessage(format!(
                "topic has {} segments, expected at least {}",
                parts.len(),
                NEXT_STOP + 1
            )));
        }

        let vehicle_number = parts[VEHICLE_NUMBER].parse::<i32>().map_err(|e| {
            IngestError::MalformedMessage(format!(
                "vehicle number '{}' is not numeric: {e}",
                parts[VEHICLE_NUMBER]
            ))
        })?;

        Ok(Self {
            event_type: parts[EVENT_TYPE].to_string(),
            route_id: parts[ROUTE_ID].to_string(),
            vehicle_number,
            destination: parts[DESTINATION].to_string(),
            next_stop: parts[NEXT_STOP].to_string(),
            start_time: parts[START_TIME].to_string(),
        })
    }

    /// `true` when the vehicle has finished its trip.
    pub fn is_end_of_trip(&self) -> bool {
        self.next_stop.is_empty() || self.next_stop == END_OF_LINE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str =
        "/hfp/v2/journey/ongoing/vp/bus/0012/01000/1055/1/Kamppi/10:00/1234/5/60;24/19/73/44";

    #[test]
    fn test_parse_extracts_fixed_segments() {
        let topic = Topic::parse(TOPIC).unwrap();

        assert_eq!(topic.event_type, "vp");
        assert_eq!(topic.route_id, "0012");
        assert_eq!(topic.vehicle_number, 1000);
        assert_eq!(topic.destination, "Kamppi");
        assert_eq!(topic.start_time, "10:00");
        assert_eq!(topic.next_stop, "1234");
        assert!(!topic.is_end_of_trip());
    }

    #[test]
    fn test_parse_too_few_segments() {
        let result = Topic::parse("/hfp/v2/journey/ongoing/vp/bus/0012/01000");
        assert!(matches!(result, Err(IngestError::MalformedMessage(_))));
    }

    #[test]
    fn test_parse_non_numeric_vehicle() {
        let raw = "/hfp/v2/journey/ongoing/vp/bus/0012/abc/1055/1/Kamppi/10:00/1234/5";
        assert!(matches!(
            Topic::parse(raw),
            Err(IngestError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_end_of_trip_sentinel_and_empty() {
        let eol = "/hfp/v2/journey/ongoing/vp/bus/0012/01000/1055/1/Kamppi/10:00/EOL/5";
        assert!(Topic::parse(eol).unwrap().is_end_of_trip());

        let empty = "/hfp/v2/journey/ongoing/vp/bus/0012/01000/1055/1/Kamppi/10:00//5";
        assert!(Topic::parse(empty).unwrap().is_end_of_trip());
    }
}
