use async_trait::async_trait;
use reqwest::{Method, Request, StatusCode, Url};
use serde::Deserialize;

use crate::fetch::HttpClient;
use crate::payload::Coordinates;
use crate::services::geocoding::{GeocodeError, ReverseGeocode};

#[derive(Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    error: Option<String>,
}

/// Reverse geocoding against a Nominatim instance.
///
/// Nominatim's `display_name` lists address parts from most to least
/// specific, separated by `", "`; [`crate::location`] depends on that order.
pub struct NominatimClient<C> {
    http: C,
    base_url: Url,
}

impl<C: HttpClient> NominatimClient<C> {
    pub fn new(http: C, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn reverse_url(&self, at: Coordinates) -> Result<Url, GeocodeError> {
        let mut url = self
            .base_url
            .join("reverse")
            .map_err(|e| GeocodeError::Provider(format!("bad Nominatim URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &at.latitude.to_string())
            .append_pair("lon", &at.longitude.to_string());
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> ReverseGeocode for NominatimClient<C> {
    async fn reverse(&self, at: Coordinates) -> Result<Option<String>, GeocodeError> {
        let req = Request::new(Method::GET, self.reverse_url(at)?);

        let response = self.http.execute(req).await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                GeocodeError::Unavailable(e.to_string())
            } else {
                GeocodeError::Provider(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(GeocodeError::Unavailable(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(GeocodeError::Provider(format!("status {status}")));
        }

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Decode(e.to_string()))?;

        // Open water and other unaddressable points come back as
        // `{"error": "Unable to geocode"}`.
        if body.error.is_some() {
            return Ok(None);
        }
        Ok(body.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Canned {
        status: u16,
        body: &'static str,
        last_url: Mutex<Option<Url>>,
    }

    #[async_trait]
    impl HttpClient for Canned {
        async fn execute(&self, req: Request) -> reqwest::Result<reqwest::Response> {
            *self.last_url.lock().unwrap() = Some(req.url().clone());
            let response = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(response.into())
        }
    }

    fn client(status: u16, body: &'static str) -> NominatimClient<Canned> {
        NominatimClient::new(
            Canned {
                status,
                body,
                last_url: Mutex::new(None),
            },
            "https://nominatim.invalid/".parse().unwrap(),
        )
    }

    const HERE: Coordinates = Coordinates {
        latitude: 60.17,
        longitude: 24.94,
    };

    #[tokio::test]
    async fn test_reverse_returns_display_name() {
        let client = client(
            200,
            r#"{"display_name": "5, Mannerheimintie, Kluuvi, Eteläinen suurpiiri, Helsinki, Helsingin seutukunta, Uusimaa, 00100, Suomi / Finland"}"#,
        );

        let address = client.reverse(HERE).await.unwrap().unwrap();
        assert!(address.starts_with("5, Mannerheimintie"));

        let url = client.http.last_url.lock().unwrap().clone().unwrap();
        assert_eq!(url.path(), "/reverse");
        assert!(url.query().unwrap().contains("lat=60.17"));
        assert!(url.query().unwrap().contains("lon=24.94"));
    }

    #[tokio::test]
    async fn test_unable_to_geocode_is_none() {
        let nominatim = client(200, r#"{"error": "Unable to geocode"}"#);
        assert_eq!(nominatim.reverse(HERE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overload_is_unavailable() {
        let busy = client(503, "busy");
        assert!(matches!(
            busy.reverse(HERE).await,
            Err(GeocodeError::Unavailable(_))
        ));

        let throttled = client(429, "slow down");
        assert!(matches!(
            throttled.reverse(HERE).await,
            Err(GeocodeError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_forbidden_is_provider_error() {
        let blocked = client(403, "blocked");
        assert!(matches!(
            blocked.reverse(HERE).await,
            Err(GeocodeError::Provider(_))
        ));
    }
}
