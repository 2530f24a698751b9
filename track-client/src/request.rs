//! One delivery attempt per call.
//!
//! [`RequestHandler::send`] hands a package to the transport under a
//! deadline and classifies what came back. It never touches the queue or
//! the tracker state; the caller decides what to do with the outcome.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use track_types::{ActivityPackage, Attribution, AttributionUpdate};

use crate::transport::{DeliveryRequest, DeliveryResponse, Transport, TransportError};

/// What the collector told us in a successful response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseData {
    /// Free-form message, logged.
    pub message: Option<String>,
    /// Attribution with its sequence, if the response carried both.
    pub attribution: Option<AttributionUpdate>,
    /// Ask again for attribution after this delay.
    pub ask_in: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    attribution: Option<Attribution>,
    #[serde(default)]
    attribution_seq: Option<u64>,
    /// Milliseconds.
    #[serde(default)]
    ask_in: Option<u64>,
}

impl ResponseData {
    /// Parse a response body. Anything unparsable yields empty data.
    pub fn parse(body: &str) -> Self {
        let body: ResponseBody = match serde_json::from_str(body) {
            Ok(body) => body,
            Err(e) => {
                if !body.trim().is_empty() {
                    tracing::debug!(error = %e, "Ignoring unparsable response body");
                }
                return Self::default();
            }
        };

        let attribution = match (body.attribution, body.attribution_seq) {
            (Some(attribution), Some(seq)) => Some(AttributionUpdate::new(seq, attribution)),
            (Some(_), None) => {
                tracing::debug!("Ignoring attribution without sequence");
                None
            }
            _ => None,
        };

        Self {
            message: body.message,
            attribution,
            ask_in: body.ask_in.map(Duration::from_millis),
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The collector accepted the package.
    Success(ResponseData),
    /// Worth trying again later.
    Retryable(String),
    /// Trying again will not help.
    Permanent(String),
}

impl DeliveryOutcome {
    /// Classify a raw response.
    pub fn from_response(response: &DeliveryResponse) -> Self {
        match response.status {
            200..=299 => Self::Success(ResponseData::parse(&response.body)),
            408 | 429 | 500..=599 => Self::Retryable(format!("status {}", response.status)),
            status => Self::Permanent(format!("status {}", status)),
        }
    }

    /// Classify a transport failure.
    pub fn from_error(error: &TransportError) -> Self {
        match error {
            TransportError::Malformed(_) => Self::Permanent(error.to_string()),
            _ => Self::Retryable(error.to_string()),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Retryable(_) => "retryable",
            Self::Permanent(_) => "permanent",
        }
    }
}

/// Performs delivery attempts through a transport.
#[derive(Clone)]
pub struct RequestHandler {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl RequestHandler {
    /// Create a handler with a per-attempt deadline.
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Make exactly one attempt to deliver `package`.
    pub async fn send(&self, package: &ActivityPackage, sent_at: u64) -> DeliveryOutcome {
        let request = DeliveryRequest::for_package(package, sent_at);

        match tokio::time::timeout(self.timeout, self.transport.send(&request)).await {
            Ok(Ok(response)) => DeliveryOutcome::from_response(&response),
            Ok(Err(e)) => DeliveryOutcome::from_error(&e),
            Err(_) => DeliveryOutcome::Retryable(format!(
                "no response within {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
