//! Transport abstraction for tally-track.
//!
//! A transport carries one package to the collector and hands back the raw
//! response. It does not classify the response: deciding what counts as
//! success, retry or permanent failure is the request handler's job.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.push_status(503);
//! let response = transport.send(&request).await?;
//! assert_eq!(response.status, 503);
//! ```

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use track_types::{ActivityPackage, Parameters};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request could not be built or encoded.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport's own deadline expired.
    #[error("request timeout")]
    Timeout,
}

/// One delivery attempt as seen by the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRequest {
    /// Endpoint path, e.g. `/event`.
    pub path: String,
    /// Package parameters in key order.
    pub parameters: Parameters,
    /// Package creation time (ms since epoch).
    pub created_at: u64,
    /// Time of this attempt (ms since epoch).
    pub sent_at: u64,
    /// Failed attempts before this one.
    pub retries: u32,
}

impl DeliveryRequest {
    /// Describe an attempt to deliver `package` at `sent_at`.
    pub fn for_package(package: &ActivityPackage, sent_at: u64) -> Self {
        Self {
            path: package.path().to_string(),
            parameters: package.parameters().clone(),
            created_at: package.created_at(),
            sent_at,
            retries: package.retries(),
        }
    }
}

/// Raw collector response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, usually JSON.
    pub body: String,
}

impl DeliveryResponse {
    /// Response with an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Transport trait for delivering packages.
///
/// Implementations handle the underlying mechanism (HTTP, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return whatever the collector answered.
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResponse, TransportError>;
}
