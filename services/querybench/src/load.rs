use std::sync::Arc;
use std::time::Duration;

use querybench_core::{BenchConfig, Checker, ConfigError};
use querybench_query::{FanoutEngine, FanoutMode, QueryBuildError, QueryBuilder};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, error, info};

use crate::outcome::IterationOutcome;

/// Throughput-oriented loop: queries random groups of hosts and ignores
/// the results.
pub struct LoadGenerator<R = StdRng> {
    id: usize,
    checker: Arc<dyn Checker>,
    engine: FanoutEngine,
    builder: QueryBuilder,
    hosts_per_query: usize,
    range: Duration,
    step: Duration,
    sleep: Duration,
    rng: R,
}

impl<R> LoadGenerator<R>
where
    R: Rng + Send,
{
    /// Fails when the configured series count cannot be served by the
    /// write-side hosts.
    pub fn new(
        id: usize,
        config: &BenchConfig,
        checker: Arc<dyn Checker>,
        engine: FanoutEngine,
        rng: R,
    ) -> Result<Self, ConfigError> {
        let hosts_per_query = config.hosts_per_query()?;

        Ok(Self {
            id,
            checker,
            engine,
            builder: QueryBuilder::new(&config.labels, config.aggregation()),
            hosts_per_query,
            range: config.load_range,
            step: config.load_step,
            sleep: config.sleep,
            rng,
        })
    }

    pub fn hosts_per_query(&self) -> usize {
        self.hosts_per_query
    }

    /// Runs one iteration without sleeping.
    pub async fn run_once(&mut self) -> IterationOutcome {
        let hosts = self.checker.host_names();

        let query = match self
            .builder
            .multi_host(&hosts, self.hosts_per_query, &mut self.rng)
        {
            Ok(query) => query,
            Err(QueryBuildError::EmptyHostPool) => {
                error!(loop_id = self.id, "no hosts returned in the checker, skipping load test round");
                return IterationOutcome::NoHosts;
            }
        };

        debug!(loop_id = self.id, query = %query, "dispatching load query");

        let result = self
            .engine
            .fanout(&query, self.range, self.step, FanoutMode::LoadOnly)
            .await;

        match result.error {
            Some(err) => IterationOutcome::FanoutFailed(err),
            None => IterationOutcome::Dispatched,
        }
    }

    /// Loops until the process exits, sleeping between iterations.
    pub async fn run(mut self) {
        info!(
            loop_id = self.id,
            hosts_per_query = self.hosts_per_query,
            "load loop started"
        );

        let mut iteration: u64 = 0;
        loop {
            if iteration > 0 {
                tokio::time::sleep(self.sleep).await;
            }
            self.run_once().await;
            iteration += 1;
        }
    }
}
