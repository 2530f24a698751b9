//! HTTP transport.
//!
//! Posts each request as a JSON body to `base_url + path`:
//!
//! ```text
//! POST /event
//! { "parameters": {...}, "created_at": 1700000000000, "sent_at": ..., "retries": 0 }
//! ```
//!
//! Any status code is returned as a response; only failures to get one
//! (DNS, connect, TLS, body read) become errors.

use super::{DeliveryRequest, DeliveryResponse, Transport, TransportError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use track_types::Parameters;

#[derive(Serialize)]
struct Body<'a> {
    parameters: &'a Parameters,
    created_at: u64,
    sent_at: u64,
    retries: u32,
}

/// Transport posting JSON over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the collector at `base_url`.
    ///
    /// `timeout` bounds each request at the HTTP layer; the request handler
    /// applies its own deadline on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tally-track/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::ConnectionFailed(e.to_string())
        } else if e.is_builder() {
            TransportError::Malformed(e.to_string())
        } else {
            TransportError::SendFailed(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResponse, TransportError> {
        let body = Body {
            parameters: &request.parameters,
            created_at: request.created_at,
            sent_at: request.sent_at,
            retries: request.retries,
        };

        let response = self
            .client
            .post(self.url(&request.path))
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(DeliveryResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let transport =
            HttpTransport::new("https://collector.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url("/event"),
            "https://collector.example.com/event"
        );
    }

    #[tokio::test]
    async fn unreachable_collector_is_an_error() {
        // Port 9 (discard) on localhost is closed on test machines.
        let transport =
            HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let request = DeliveryRequest {
            path: "/event".into(),
            parameters: Parameters::new(),
            created_at: 1,
            sent_at: 1,
            retries: 0,
        };

        assert!(transport.send(&request).await.is_err());
    }
}
