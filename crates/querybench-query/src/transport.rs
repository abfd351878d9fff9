use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// How much of a response body the caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRead {
    /// Drain the body without keeping it.
    Discard,
    /// Keep the whole body.
    Full,
    /// Keep at most this many bytes.
    Limit(usize),
}

/// Status and (optionally) body returned by one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: Option<Bytes>,
}

impl EndpointResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to complete a request against a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request task failed: {0}")]
    Task(String),
}

/// Issues a single GET against a fully formed query URL.
///
/// Non-2xx responses are not errors at this level; only failures to reach
/// the endpoint or to read its body are.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn execute(&self, url: &str, body: BodyRead) -> Result<EndpointResponse, TransportError>;
}

/// reqwest-backed transport with per-request timeout and fixed headers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Config(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Config(format!("header value for {name}: {e}")))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn execute(&self, url: &str, body: BodyRead) -> Result<EndpointResponse, TransportError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();

        let body = match body {
            BodyRead::Discard => {
                // Drained so the connection can go back to the pool.
                while let Ok(Some(_)) = response.chunk().await {}
                None
            }
            BodyRead::Full => Some(
                response
                    .bytes()
                    .await
                    .map_err(|e| TransportError::Body(e.to_string()))?,
            ),
            BodyRead::Limit(limit) => {
                let mut buf = BytesMut::new();
                while buf.len() < limit {
                    match response.chunk().await {
                        Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                        Ok(None) => break,
                        Err(e) => return Err(TransportError::Body(e.to_string())),
                    }
                }
                buf.truncate(limit);
                while let Ok(Some(_)) = response.chunk().await {}
                Some(buf.freeze())
            }
        };

        Ok(EndpointResponse { status, body })
    }
}
