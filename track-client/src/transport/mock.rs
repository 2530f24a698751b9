//! Mock transport for testing.
//!
//! Scripted responses are returned in order; once the script runs out every
//! request gets the default response (200 with an empty JSON object). Every
//! request is recorded, and a concurrency counter tracks how many sends were
//! in progress at once.

use super::{DeliveryRequest, DeliveryResponse, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(DeliveryResponse),
    Fail(String),
}

/// Mock transport for testing.
///
/// Clones share the same script and recordings.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    script: VecDeque<Scripted>,
    default_response: Option<DeliveryResponse>,
    requests: Vec<DeliveryRequest>,
    latency: Duration,
    active: usize,
    max_active: usize,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a response with the given status and an empty JSON body.
    pub fn push_status(&self, status: u16) {
        self.push_response(status, "{}");
    }

    /// Queue a response with the given status and body.
    pub fn push_response(&self, status: u16, body: &str) {
        self.lock().script.push_back(Scripted::Respond(DeliveryResponse {
            status,
            body: body.to_string(),
        }));
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().script.push_back(Scripted::Fail(error.to_string()));
    }

    /// Response used once the script is exhausted.
    pub fn set_default_response(&self, status: u16, body: &str) {
        self.lock().default_response = Some(DeliveryResponse {
            status,
            body: body.to_string(),
        });
    }

    /// Make every send take at least `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Paths of every request received, in order.
    pub fn paths(&self) -> Vec<String> {
        self.lock().requests.iter().map(|r| r.path.clone()).collect()
    }

    /// Highest number of sends observed in progress at the same time.
    pub fn max_active(&self) -> usize {
        self.lock().max_active
    }

    /// Clear script, recordings and counters.
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

/// Decrements the active count when a send finishes or is cancelled.
struct ActiveGuard<'a>(&'a MockTransport);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.active = inner.active.saturating_sub(1);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResponse, TransportError> {
        let latency = {
            let mut inner = self.lock();
            inner.active += 1;
            inner.max_active = inner.max_active.max(inner.active);
            inner.latency
        };
        let active = ActiveGuard(self);

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        drop(active);

        let mut inner = self.lock();
        inner.requests.push(request.clone());

        match inner.script.pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(TransportError::SendFailed(error)),
            None => Ok(inner
                .default_response
                .clone()
                .unwrap_or_else(|| DeliveryResponse {
                    status: 200,
                    body: "{}".to_string(),
                })),
        }
    }
}
