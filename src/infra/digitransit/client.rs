use async_trait::async_trait;
use reqwest::{Method, Request, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fetch::HttpClient;
use crate::payload::Coordinates;
use crate::services::stop_lookup::{StopInfo, StopLookup, StopLookupError};

const STOP_QUERY: &str = "query GetStop($id: String!) { stop(id: $id) { name lat lon } }";

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<StopData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct StopData {
    stop: Option<StopNode>,
}

#[derive(Deserialize)]
struct StopNode {
    name: String,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// Stop lookup against the Digitransit routing GraphQL API.
///
/// Stop ids from the feed are bare numbers; the API wants them qualified with
/// the feed namespace (`HSL:1234`).
pub struct DigitransitClient<C> {
    http: C,
    url: Url,
    namespace: String,
}

impl<C: HttpClient> DigitransitClient<C> {
    pub fn new(http: C, url: Url, namespace: impl Into<String>) -> Self {
        Self {
            http,
            url,
            namespace: namespace.into(),
        }
    }

    fn build_request(&self, stop_id: &str) -> Result<Request, StopLookupError> {
        let body = GraphQlRequest {
            query: STOP_QUERY,
            variables: json!({ "id": format!("{}:{}", self.namespace, stop_id) }),
        };
        let body = serde_json::to_vec(&body).map_err(|e| StopLookupError::Query(e.to_string()))?;

        let mut req = Request::new(Method::POST, self.url.clone());
        req.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        req.headers_mut().insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache"),
        );
        *req.body_mut() = Some(body.into());
        Ok(req)
    }
}

#[async_trait]
impl<C: HttpClient> StopLookup for DigitransitClient<C> {
    async fn find_stop(&self, stop_id: &str) -> Result<Option<StopInfo>, StopLookupError> {
        let req = self.build_request(stop_id)?;
        let response = self.http.execute(req).await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(StopLookupError::AccessDenied);
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(StopLookupError::Query(format!(
                    "API returned status {status}: {body}"
                )));
            }
            _ => {}
        }

        let parsed: GraphQlResponse = response.json().await?;

        if let Some(first) = parsed.errors.first() {
            return Err(StopLookupError::Query(first.message.clone()));
        }

        Ok(parsed.data.and_then(|d| d.stop).map(|stop| StopInfo {
            name: stop.name,
            coordinates: Coordinates {
                latitude: stop.lat,
                longitude: stop.lon,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Canned {
        status: u16,
        body: &'static str,
        last_body: Mutex<Option<String>>,
    }

    impl Canned {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                last_body: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl HttpClient for Canned {
        async fn execute(&self, req: Request) -> reqwest::Result<reqwest::Response> {
            let sent = req
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| String::from_utf8_lossy(b).into_owned());
            *self.last_body.lock().unwrap() = sent;

            let response = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(response.into())
        }
    }

    fn client(http: Canned) -> DigitransitClient<Canned> {
        DigitransitClient::new(
            http,
            "https://api.digitransit.invalid/graphql".parse().unwrap(),
            "HSL",
        )
    }

    #[tokio::test]
    async fn test_find_stop_success() {
        let client = client(Canned::new(
            200,
            r#"{"data": {"stop": {"name": "Kamppi", "lat": 60.169, "lon": 24.931}}}"#,
        ));

        let stop = client.find_stop("1234").await.unwrap().unwrap();

        assert_eq!(stop.name, "Kamppi");
        assert_eq!(stop.coordinates.latitude, 60.169);
        assert_eq!(stop.coordinates.longitude, 24.931);

        let sent = client.http.last_body.lock().unwrap().clone().unwrap();
        assert!(sent.contains("HSL:1234"));
    }

    #[tokio::test]
    async fn test_unknown_stop_is_none() {
        let client = client(Canned::new(200, r#"{"data": {"stop": null}}"#));
        assert!(client.find_stop("0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_is_access_denied() {
        let client = client(Canned::new(401, "denied"));
        assert!(matches!(
            client.find_stop("1234").await,
            Err(StopLookupError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_query_errors() {
        let client = client(Canned::new(
            200,
            r#"{"data": null, "errors": [{"message": "bad id"}]}"#,
        ));
        assert!(matches!(
            client.find_stop("x").await,
            Err(StopLookupError::Query(msg)) if msg == "bad id"
        ));
    }
}
