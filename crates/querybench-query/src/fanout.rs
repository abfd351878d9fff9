//! Concurrent dispatch of one query to every backend replica.
//!
//! A fanout call sends the same request to all configured endpoints at
//! once and waits for every one of them. Each endpoint runs in its own task
//! and hands back its own outcome; results are only combined after the last
//! task has finished, so no state is shared between tasks.
//!
//! ```text
//!                 fanout(query, range, step, mode)
//!                              │
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//!   ┌──────────┐         ┌──────────┐         ┌──────────┐
//!   │ replica0 │         │ replica1 │         │ replica2 │
//!   └──────────┘         └──────────┘         └──────────┘
//!         └────────────────────┼────────────────────┘
//!                              ▼
//!        transport errors? ── yes ──▶ FanoutError::Transport
//!                              │ no
//!        CompareResults and ≥ 2 payloads?
//!                              │ yes
//!        all payloads equal? ── no ──▶ FanoutError::ResultMismatch
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::transport::{BodyRead, EndpointResponse, QueryTransport, TransportError};
use crate::window::QueryWindow;

/// What the caller wants back from a fanout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutMode {
    /// Generate load only; response bodies are dropped.
    LoadOnly,
    /// Keep every body and require them to be byte-identical.
    CompareResults,
}

/// A request that could not be completed against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointError {
    pub url: String,
    pub source: TransportError,
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.source)
    }
}

impl std::error::Error for EndpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Every endpoint failure of a single fanout call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointErrors(Vec<EndpointError>);

impl EndpointErrors {
    pub fn push(&mut self, error: EndpointError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointError> {
        self.0.iter()
    }

    /// `None` when nothing failed.
    pub fn into_error(self) -> Option<FanoutError> {
        if self.0.is_empty() {
            None
        } else {
            Some(FanoutError::Transport(self))
        }
    }
}

impl fmt::Display for EndpointErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} endpoint(s) failed: ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Why a fanout call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FanoutError {
    /// One or more endpoints could not be reached or read.
    #[error("{0}")]
    Transport(EndpointErrors),

    /// Replicas answered the same query with different data.
    #[error("mismatch in returned data at payload {index} of {payloads}")]
    ResultMismatch { index: usize, payloads: usize },
}

impl FanoutError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::ResultMismatch { .. })
    }
}

/// Outcome of one fanout call.
///
/// `payloads` holds the collected bodies in completion order. It is empty in
/// [`FanoutMode::LoadOnly`] and may be partial when `error` is set; callers
/// must treat any error as a failure of the whole call.
#[derive(Debug, Clone, Default)]
pub struct FanoutResult {
    pub payloads: Vec<Bytes>,
    pub error: Option<FanoutError>,
}

impl FanoutResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends range queries to every configured endpoint concurrently.
///
/// Holds no per-call state, so clones can be shared freely between driver
/// loops.
#[derive(Clone)]
pub struct FanoutEngine {
    endpoints: Arc<[String]>,
    transport: Arc<dyn QueryTransport>,
    debug: bool,
    debug_length: usize,
}

impl fmt::Debug for FanoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutEngine")
            .field("endpoints", &self.endpoints)
            .field("debug", &self.debug)
            .field("debug_length", &self.debug_length)
            .finish_non_exhaustive()
    }
}

impl FanoutEngine {
    pub fn new(endpoints: Vec<String>, transport: Arc<dyn QueryTransport>) -> Self {
        Self {
            endpoints: endpoints.into(),
            transport,
            debug: false,
            debug_length: 0,
        }
    }

    /// Log every request and up to `debug_length` bytes of each response
    /// (0 = whole body).
    #[must_use]
    pub fn with_debug(mut self, debug: bool, debug_length: usize) -> Self {
        self.debug = debug;
        self.debug_length = debug_length;
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Runs `query` over the window `[now - range, now]` on every endpoint.
    pub async fn fanout(
        &self,
        query: &str,
        range: Duration,
        step: Duration,
        mode: FanoutMode,
    ) -> FanoutResult {
        self.fanout_window(query, QueryWindow::now(range, step), mode)
            .await
    }

    /// Same as [`fanout`](Self::fanout) with an explicit window.
    pub async fn fanout_window(
        &self,
        query: &str,
        window: QueryWindow,
        mode: FanoutMode,
    ) -> FanoutResult {
        let query_string = window.encode(query);
        let body = self.body_read(mode);

        let mut tasks = JoinSet::new();
        let mut task_urls = HashMap::with_capacity(self.endpoints.len());
        for endpoint in self.endpoints.iter() {
            let url = format!("{endpoint}?{query_string}");

            if self.debug {
                info!(
                    url = %url,
                    query,
                    start = window.start,
                    end = window.end,
                    step = ?window.step,
                    "fanout query"
                );
            }

            let transport = Arc::clone(&self.transport);
            let task_url = url.clone();
            let handle = tasks.spawn(async move {
                let outcome = transport.execute(&url, body).await;
                (url, outcome)
            });
            task_urls.insert(handle.id(), task_url);
        }

        let mut payloads = Vec::with_capacity(self.endpoints.len());
        let mut errors = EndpointErrors::default();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, Ok(response))) => {
                    if let Some(payload) = self.accept(&url, response, mode) {
                        payloads.push(payload);
                    }
                }
                Ok((url, Err(source))) => errors.push(EndpointError { url, source }),
                Err(join_err) => errors.push(EndpointError {
                    url: task_urls.remove(&join_err.id()).unwrap_or_default(),
                    source: TransportError::Task(join_err.to_string()),
                }),
            }
        }

        if let Some(err) = errors.into_error() {
            error!(error = %err, "fanout error");
            return FanoutResult {
                payloads,
                error: Some(err),
            };
        }

        // Fewer than two payloads leaves nothing to compare.
        if mode == FanoutMode::LoadOnly || payloads.len() < 2 {
            return FanoutResult {
                payloads,
                error: None,
            };
        }

        let error = compare_payloads(&payloads);
        FanoutResult { payloads, error }
    }

    fn body_read(&self, mode: FanoutMode) -> BodyRead {
        match mode {
            FanoutMode::CompareResults => BodyRead::Full,
            FanoutMode::LoadOnly if self.debug && self.debug_length > 0 => {
                BodyRead::Limit(self.debug_length)
            }
            FanoutMode::LoadOnly if self.debug => BodyRead::Full,
            FanoutMode::LoadOnly => BodyRead::Discard,
        }
    }

    fn accept(&self, url: &str, response: EndpointResponse, mode: FanoutMode) -> Option<Bytes> {
        if !response.is_success() {
            warn!(url, code = response.status, "response from query non-2XX status code");
        }

        let body = response.body?;

        if self.debug {
            let shown = match self.debug_length {
                0 => &body[..],
                limit => &body[..limit.min(body.len())],
            };
            info!(
                url,
                limit = self.debug_length,
                body = %String::from_utf8_lossy(shown),
                "response body"
            );
        }

        match mode {
            FanoutMode::CompareResults => Some(body),
            FanoutMode::LoadOnly => None,
        }
    }
}

/// Compares every payload with the first one collected.
fn compare_payloads(payloads: &[Bytes]) -> Option<FanoutError> {
    let (first, rest) = payloads.split_first()?;

    let index = rest.iter().position(|payload| payload != first)? + 1;
    error!(index, payloads = payloads.len(), "mismatch in returned data");

    Some(FanoutError::ResultMismatch {
        index,
        payloads: payloads.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_identical_payloads() {
        let payloads = vec![Bytes::from_static(b"a"); 3];
        assert!(compare_payloads(&payloads).is_none());
    }

    #[test]
    fn test_compare_reports_first_difference() {
        let payloads = vec![
            Bytes::from_static(b"a"),
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
            Bytes::from_static(b"c"),
        ];
        assert_eq!(
            compare_payloads(&payloads),
            Some(FanoutError::ResultMismatch {
                index: 2,
                payloads: 4
            })
        );
    }

    #[test]
    fn test_endpoint_errors_display() {
        let mut errors = EndpointErrors::default();
        errors.push(EndpointError {
            url: "http://a/q".to_string(),
            source: TransportError::Request("refused".to_string()),
        });
        errors.push(EndpointError {
            url: "http://b/q".to_string(),
            source: TransportError::Body("reset".to_string()),
        });

        let err = errors.into_error().unwrap();
        assert!(err.is_transport());
        assert!(!err.is_mismatch());
        assert_eq!(
            err.to_string(),
            "2 endpoint(s) failed: http://a/q: failed to send request: refused; \
             http://b/q: failed to read response body: reset"
        );
    }

    #[test]
    fn test_no_errors_is_none() {
        assert!(EndpointErrors::default().into_error().is_none());
    }

    #[test]
    fn test_result_is_ok() {
        let ok = FanoutResult {
            payloads: vec![Bytes::from_static(b"x")],
            error: None,
        };
        assert!(ok.is_ok());

        let failed = FanoutResult {
            payloads: vec![],
            error: Some(FanoutError::ResultMismatch {
                index: 1,
                payloads: 2,
            }),
        };
        assert!(!failed.is_ok());
    }
}
