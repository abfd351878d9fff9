use std::collections::BTreeMap;

use querybench_core::Datapoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Prometheus HTTP API query response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromQueryResult {
    pub status: String,
    pub data: PromQueryData,
}

/// `data` section of a range query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromQueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: Vec<PromQueryMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

/// One series of a matrix result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromQueryMatrix {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub values: Vec<Sample>,
}

/// `[unixTimestamp, "value"]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, String)", into = "(f64, String)")]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl TryFrom<(f64, String)> for Sample {
    type Error = String;

    fn try_from((timestamp, value): (f64, String)) -> Result<Self, Self::Error> {
        let value = value
            .parse()
            .map_err(|e| format!("invalid sample value {value:?}: {e}"))?;
        Ok(Self { timestamp, value })
    }
}

impl From<Sample> for (f64, String) {
    fn from(sample: Sample) -> Self {
        (sample.timestamp, sample.value.to_string())
    }
}

/// Why a response failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unable to decode query result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("expecting one result series, but got {0}")]
    SeriesCount(usize),

    #[error("no samples returned for the series")]
    EmptySeries,

    #[error("none of the {returned} returned values matched")]
    NoMatches { returned: usize },
}

/// Counts from a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    pub returned: usize,
    pub matches: usize,
}

/// Checks a replica's answer against values known to have been written.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultValidator;

impl ResultValidator {
    /// Decodes `raw` and counts returned samples whose value equals any
    /// expected value.
    ///
    /// Each returned value is looked up across the whole expected sequence,
    /// so order and repetition are not checked. Values compare with exact
    /// float equality since both sides come from the same write path.
    pub fn check(expected: &[Datapoint], raw: &[u8]) -> Result<ValidationReport, ValidationError> {
        let result: PromQueryResult = serde_json::from_slice(raw)?;

        let [series] = result.data.result.as_slice() else {
            return Err(ValidationError::SeriesCount(result.data.result.len()));
        };

        if series.values.is_empty() {
            return Err(ValidationError::EmptySeries);
        }

        let matches = series
            .values
            .iter()
            .filter(|sample| expected.iter().any(|dp| dp.value == sample.value))
            .count();

        if matches == 0 {
            return Err(ValidationError::NoMatches {
                returned: series.values.len(),
            });
        }

        Ok(ValidationReport {
            returned: series.values.len(),
            matches,
        })
    }

    /// [`check`](Self::check) reduced to pass/fail, logging the failure.
    pub fn validate(expected: &[Datapoint], raw: &[u8]) -> bool {
        match Self::check(expected, raw) {
            Ok(report) => {
                debug!(
                    returned = report.returned,
                    matches = report.matches,
                    "query result validated"
                );
                true
            }
            Err(ValidationError::EmptySeries) => {
                warn!("no results returned from query, there may be a slight delay in ingestion");
                false
            }
            Err(err) => {
                error!(error = %err, expected = expected.len(), "query result validation failed");
                false
            }
        }
    }
}
