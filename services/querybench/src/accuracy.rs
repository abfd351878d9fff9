use std::sync::Arc;
use std::time::Duration;

use querybench_core::{BenchConfig, Checker, Datapoints};
use querybench_query::{FanoutEngine, FanoutMode, QueryBuilder, ResultValidator};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{error, info, info_span};

use crate::outcome::IterationOutcome;

/// Random picks made while looking for a host worth validating.
pub const HOST_PICK_ATTEMPTS: usize = 5;

/// Fewest datapoints a host needs for its query to be worth validating.
const MIN_DATAPOINTS: usize = 2;

/// Consistency loop: queries one host at a time, requires every replica to
/// return the same bytes and checks the samples against the checker.
pub struct AccuracyChecker<R = StdRng> {
    checker: Arc<dyn Checker>,
    engine: FanoutEngine,
    builder: QueryBuilder,
    range: Duration,
    step: Duration,
    sleep: Duration,
    rng: R,
}

impl<R> AccuracyChecker<R>
where
    R: Rng + Send,
{
    pub fn new(
        config: &BenchConfig,
        checker: Arc<dyn Checker>,
        engine: FanoutEngine,
        rng: R,
    ) -> Self {
        Self {
            checker,
            engine,
            builder: QueryBuilder::new(&config.labels, config.aggregation()),
            range: config.accuracy_range,
            step: config.accuracy_step,
            sleep: config.sleep,
            rng,
        }
    }

    /// Runs one iteration without sleeping. `iteration` only affects which
    /// conditions are logged: hosts are expected to be missing right after
    /// startup.
    pub async fn run_once(&mut self, iteration: u64) -> IterationOutcome {
        let hosts = self.checker.host_names();
        let Some((host, datapoints)) = self.pick_host(&hosts) else {
            if iteration > 0 {
                error!("no hosts returned in the checker, skipping accuracy check");
            }
            return IterationOutcome::NoHosts;
        };

        if datapoints.len() < MIN_DATAPOINTS && iteration > 1 {
            error!(
                host = %host,
                datapoints = datapoints.len(),
                "couldn't find a host with more than 1 datapoint"
            );
        }

        let query = match self.builder.single_host(&host) {
            Ok(query) => query,
            Err(err) => {
                error!(host = %host, error = %err, "unable to build accuracy query");
                return IterationOutcome::NoHosts;
            }
        };

        let result = self
            .engine
            .fanout(&query, self.range, self.step, FanoutMode::CompareResults)
            .await;

        if let Some(err) = result.error {
            error!(host = %host, error = %err, "fanout execution failed");
            return IterationOutcome::FanoutFailed(err);
        }

        if result.payloads.is_empty() {
            error!(host = %host, "invalid response for accuracy query");
            return IterationOutcome::EmptyResponse;
        }

        let mut passed = 0;
        let mut failed = 0;
        for (index, payload) in result.payloads.iter().enumerate() {
            let span = info_span!("validate", host = %host, index);
            let valid = span.in_scope(|| ResultValidator::validate(&datapoints, payload));
            if valid {
                passed += 1;
            } else {
                failed += 1;
            }
        }

        info!(host = %host, passed, failed, "accuracy check complete");
        IterationOutcome::Validated { passed, failed }
    }

    /// Picks a random host, retrying a few times when the pick has too few
    /// datapoints. Settles for the last pick when none qualifies.
    fn pick_host(&mut self, hosts: &[String]) -> Option<(String, Datapoints)> {
        let mut picked = None;

        for _ in 0..HOST_PICK_ATTEMPTS {
            let host = hosts.choose(&mut self.rng)?;
            let datapoints = self.checker.datapoints(host);
            let enough = datapoints.len() >= MIN_DATAPOINTS;
            picked = Some((host.clone(), datapoints));
            if enough {
                break;
            }
        }

        picked
    }

    /// Loops until the process exits, sleeping between iterations.
    pub async fn run(mut self) {
        info!("accuracy loop started");

        let mut iteration: u64 = 0;
        loop {
            if iteration > 0 {
                tokio::time::sleep(self.sleep).await;
            }
            self.run_once(iteration).await;
            iteration += 1;
        }
    }
}
