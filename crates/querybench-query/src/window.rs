use std::time::Duration;

use chrono::{DateTime, Utc};
use url::form_urlencoded;

/// Absolute time window of a range query, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: i64,
    pub end: i64,
    pub step: Duration,
}

/// Errors raised while reading a query string back into a window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowDecodeError {
    #[error("missing query parameter `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{param}`: {value}")]
    Invalid { param: &'static str, value: String },
}

impl QueryWindow {
    /// Window of length `range` ending now.
    pub fn now(range: Duration, step: Duration) -> Self {
        Self::ending_at(Utc::now(), range, step)
    }

    /// Window of length `range` ending at `now`. Both bounds are truncated
    /// to whole seconds.
    pub fn ending_at(now: DateTime<Utc>, range: Duration, step: Duration) -> Self {
        let range_ms = i64::try_from(range.as_millis()).unwrap_or(i64::MAX);
        let start_ms = now.timestamp_millis().saturating_sub(range_ms);

        Self {
            start: start_ms.div_euclid(1000),
            end: now.timestamp(),
            step,
        }
    }

    /// Request parameters for `query` over this window.
    pub fn params(&self, query: &str) -> [(&'static str, String); 4] {
        [
            ("query", query.to_string()),
            ("start", self.start.to_string()),
            ("end", self.end.to_string()),
            ("step", format_step(self.step)),
        ]
    }

    /// URL-encoded query string, ready to append after `?`.
    pub fn encode(&self, query: &str) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.params(query) {
            serializer.append_pair(name, &value);
        }
        serializer.finish()
    }

    /// Parses an encoded query string the way a backend would, returning the
    /// query text and its window.
    pub fn decode(encoded: &str) -> Result<(String, Self), WindowDecodeError> {
        let mut query = None;
        let mut start = None;
        let mut end = None;
        let mut step = None;

        for (name, value) in form_urlencoded::parse(encoded.as_bytes()) {
            match name.as_ref() {
                "query" => query = Some(value.into_owned()),
                "start" => start = Some(parse_seconds("start", &value)?),
                "end" => end = Some(parse_seconds("end", &value)?),
                "step" => step = Some(parse_step(&value)?),
                _ => {}
            }
        }

        let window = Self {
            start: start.ok_or(WindowDecodeError::Missing("start"))?,
            end: end.ok_or(WindowDecodeError::Missing("end"))?,
            step: step.ok_or(WindowDecodeError::Missing("step"))?,
        };

        Ok((query.ok_or(WindowDecodeError::Missing("query"))?, window))
    }
}

/// Step as a plain number of seconds ("15", "0.5").
fn format_step(step: Duration) -> String {
    step.as_secs_f64().to_string()
}

fn parse_step(value: &str) -> Result<Duration, WindowDecodeError> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| WindowDecodeError::Invalid {
            param: "step",
            value: value.to_string(),
        })
}

fn parse_seconds(param: &'static str, value: &str) -> Result<i64, WindowDecodeError> {
    value.parse().map_err(|_| WindowDecodeError::Invalid {
        param,
        value: value.to_string(),
    })
}
