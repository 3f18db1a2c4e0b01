//! Reverse geocoding with bounded retry and a global request rate.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::payload::Coordinates;

#[derive(Error, Debug)]
pub enum GeocodeError {
    /// Transient: the provider is overloaded, rate limiting us, or unreachable.
    #[error("geocoding provider unavailable: {0}")]
    Unavailable(String),
    #[error("geocoding provider rejected the request: {0}")]
    Provider(String),
    #[error("failed to decode geocoding response: {0}")]
    Decode(String),
}

/// A single reverse-geocoding attempt against one provider.
#[async_trait]
pub trait ReverseGeocode: Send + Sync {
    /// Returns the provider's formatted address for `at`, or `None` if it has
    /// nothing there.
    async fn reverse(&self, at: Coordinates) -> Result<Option<String>, GeocodeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct GeocoderSettings {
    /// Minimum spacing between any two outbound requests.
    pub min_interval: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1100),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Shared front for a [`ReverseGeocode`] provider.
///
/// Every request, retries included, first waits on one process-wide limiter,
/// so callers sharing an instance never exceed the provider's rate. A call
/// holds its caller for the whole sequence of attempts and delays.
pub struct ReverseGeocoder {
    provider: Box<dyn ReverseGeocode>,
    limiter: DefaultDirectRateLimiter,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ReverseGeocoder {
    pub fn new(
        provider: impl ReverseGeocode + 'static,
        settings: GeocoderSettings,
    ) -> Result<Self> {
        let quota = Quota::with_period(settings.min_interval)
            .ok_or_else(|| anyhow!("geocoder minimum interval must be non-zero"))?;
        if settings.max_attempts == 0 {
            return Err(anyhow!("geocoder needs at least one attempt"));
        }

        Ok(Self {
            provider: Box::new(provider),
            limiter: RateLimiter::direct(quota),
            max_attempts: settings.max_attempts,
            retry_delay: settings.retry_delay,
        })
    }

    /// Resolves `at` to a formatted address. `None` means unresolved: the
    /// provider had no address, refused the request, or stayed unavailable
    /// for every attempt.
    #[tracing::instrument(skip(self), fields(lat = at.latitude, lon = at.longitude))]
    pub async fn resolve(&self, at: Coordinates) -> Option<String> {
        for attempt in 1..=self.max_attempts {
            self.limiter.until_ready().await;

            match self.provider.reverse(at).await {
                Ok(address) => {
                    debug!(attempt, found = address.is_some(), "Reverse geocode finished");
                    return address;
                }
                Err(GeocodeError::Unavailable(reason)) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        retry_in_secs = self.retry_delay.as_secs_f64(),
                        %reason,
                        "Geocoding provider unavailable"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Reverse geocode failed");
                    return None;
                }
            }
        }

        warn!(max_attempts = self.max_attempts, "Giving up on reverse geocode");
        None
    }
}
