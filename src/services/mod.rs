//! Traits for the external services the pipeline depends on.

pub mod geocoding;
pub mod stop_lookup;
