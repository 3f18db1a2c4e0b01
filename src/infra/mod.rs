//! Concrete implementations of the service traits and static configuration
//! data.

pub mod digitransit;
pub mod nominatim;
pub mod operators;
