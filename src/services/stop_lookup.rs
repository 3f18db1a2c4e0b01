//! Trait and types for looking up stop metadata.

use thiserror::Error;

use crate::payload::Coordinates;

/// Name and position of a single stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopInfo {
    pub name: String,
    pub coordinates: Coordinates,
}

#[derive(Error, Debug)]
pub enum StopLookupError {
    #[error("access denied by stop lookup service")]
    AccessDenied,
    #[error("stop lookup transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stop lookup query failed: {0}")]
    Query(String),
}

/// Abstraction over a stop-lookup provider (e.g., Digitransit).
#[async_trait::async_trait]
pub trait StopLookup: Send + Sync {
    /// Returns the stop for `stop_id`, or `None` when the service does not
    /// know it.
    async fn find_stop(&self, stop_id: &str) -> Result<Option<StopInfo>, StopLookupError>;
}
