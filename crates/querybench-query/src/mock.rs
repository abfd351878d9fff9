use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::transport::{BodyRead, EndpointResponse, QueryTransport, TransportError};

/// Scripted reply for one endpoint.
#[derive(Debug, Clone)]
pub struct MockResponse {
    outcome: Result<(u16, Bytes), TransportError>,
    delay: Duration,
}

impl MockResponse {
    /// 200 OK with `body`.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            outcome: Ok((200, body.into())),
            delay: Duration::ZERO,
        }
    }

    /// Transport-level failure.
    pub fn fail(error: TransportError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        if let Ok((code, _)) = &mut self.outcome {
            *code = status;
        }
        self
    }

    /// Simulated latency before the reply is produced.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory transport for tests.
///
/// Replies are keyed by endpoint (the URL without its query string).
/// Unscripted endpoints fail with a request error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: HashMap<String, MockResponse>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(mut self, endpoint: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(endpoint.into(), response);
        self
    }

    /// Full URLs requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of requests made to `endpoint`.
    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|url| endpoint_of(url) == endpoint)
            .count()
    }

    /// Highest number of requests observed in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn endpoint_of(url: &str) -> &str {
    url.split_once('?').map_or(url, |(endpoint, _)| endpoint)
}

#[async_trait]
impl QueryTransport for MockTransport {
    async fn execute(&self, url: &str, body: BodyRead) -> Result<EndpointResponse, TransportError> {
        self.calls.lock().push(url.to_string());

        let Some(response) = self.responses.get(endpoint_of(url)).cloned() else {
            return Err(TransportError::Request(format!("connection refused: {url}")));
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (status, payload) = response.outcome?;
        let body = match body {
            BodyRead::Discard => None,
            BodyRead::Full => Some(payload),
            BodyRead::Limit(limit) => Some(payload.slice(..limit.min(payload.len()))),
        };

        Ok(EndpointResponse { status, body })
    }
}
