//! Suppression of repeated positions.
//!
//! A stationary vehicle keeps re-emitting the same position. Each measurement
//! channel remembers the last address it resolved and rejects an identical
//! one, so a stop of any length collapses into a single stored record.

use crate::payload::LocationSource;

/// Independent duplicate-tracking streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Live GPS and manually entered positions share one slot.
    Satellite,
    Odometer,
}

impl Channel {
    pub fn for_source(source: LocationSource) -> Option<Self> {
        match source {
            LocationSource::Gps | LocationSource::Manual => Some(Self::Satellite),
            LocationSource::Odometer => Some(Self::Odometer),
            LocationSource::Unavailable => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DuplicateFilter {
    last_satellite: Option<String>,
    last_odometer: Option<String>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `address` for `channel`. Returns `false` when it repeats the
    /// channel's previous address and the message should be dropped.
    pub fn admit(&mut self, channel: Channel, address: &str) -> bool {
        let slot = match channel {
            Channel::Satellite => &mut self.last_satellite,
            Channel::Odometer => &mut self.last_odometer,
        };

        if slot.as_deref() == Some(address) {
            return false;
        }

        *slot = Some(address.to_string());
        true
    }
}
