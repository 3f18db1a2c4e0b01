use crate::fetch::client::HttpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// The Digitransit routing API expects its subscription key in the
/// `digitransit-subscription-key` header; see [`ApiKey::digitransit`].
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    key: HeaderValue,
}

impl<C> ApiKey<C> {
    /// Validates `header_name` and `key` up front so that `execute` never
    /// has to.
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .with_context(|| format!("invalid header name '{header_name}'"))?;
        let mut key = HeaderValue::from_str(key).context("API key is not a valid header value")?;
        key.set_sensitive(true);

        Ok(Self {
            inner,
            header_name,
            key,
        })
    }

    pub fn digitransit(inner: C, key: &str) -> Result<Self> {
        Self::new(inner, "digitransit-subscription-key", key)
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.key.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Option<HeaderValue>>,
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            *self.seen.lock().unwrap() = req
                .headers()
                .get("digitransit-subscription-key")
                .cloned();
            Ok(http::Response::new("{}").into())
        }
    }

    #[tokio::test]
    async fn test_header_is_injected() {
        let client = ApiKey::digitransit(Recorder::default(), "secret").unwrap();
        let req = reqwest::Request::new(
            reqwest::Method::POST,
            "https://example.invalid/graphql".parse().unwrap(),
        );

        client.execute(req).await.unwrap();

        let seen = client.inner.seen.lock().unwrap().clone();
        assert_eq!(seen.unwrap().to_str().unwrap(), "secret");
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(ApiKey::digitransit(Recorder::default(), "bad\nkey").is_err());
    }
}
