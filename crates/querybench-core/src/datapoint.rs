use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sample known to have been written for a host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Datapoint {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples for one host in ascending timestamp order.
pub type Datapoints = Vec<Datapoint>;
