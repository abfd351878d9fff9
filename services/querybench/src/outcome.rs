use querybench_query::FanoutError;

/// What a single driver loop iteration did.
#[derive(Debug)]
pub enum IterationOutcome {
    /// The checker knew no hosts; nothing was sent.
    NoHosts,
    /// Load query sent and every endpoint answered.
    Dispatched,
    /// Fanout failed on transport or replicas disagreed.
    FanoutFailed(FanoutError),
    /// Fanout succeeded but returned no payloads to validate.
    EmptyResponse,
    /// Payloads were validated against the checker's datapoints.
    Validated { passed: usize, failed: usize },
}

impl IterationOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            Self::FanoutFailed(_) | Self::EmptyResponse => true,
            Self::Validated { failed, .. } => *failed > 0,
            Self::NoHosts | Self::Dispatched => false,
        }
    }
}
