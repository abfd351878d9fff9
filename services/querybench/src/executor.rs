use std::sync::Arc;

use querybench_core::{BenchConfig, Checker};
use querybench_query::{FanoutEngine, HttpTransport, QueryTransport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinSet;
use tracing::info;

use crate::accuracy::AccuracyChecker;
use crate::error::RunnerError;
use crate::load::LoadGenerator;

/// Owns the shared fanout engine and launches the driver loops.
pub struct QueryExecutor {
    config: BenchConfig,
    checker: Arc<dyn Checker>,
    engine: FanoutEngine,
}

impl QueryExecutor {
    pub fn new(
        config: BenchConfig,
        checker: Arc<dyn Checker>,
        transport: Arc<dyn QueryTransport>,
    ) -> Self {
        let engine = FanoutEngine::new(config.endpoints.clone(), transport)
            .with_debug(config.debug, config.debug_length);

        Self {
            config,
            checker,
            engine,
        }
    }

    /// Builds an executor talking HTTP to the configured endpoints.
    pub fn from_config(config: BenchConfig, checker: Arc<dyn Checker>) -> Result<Self, RunnerError> {
        let transport = HttpTransport::new(&config.headers, config.request_timeout)?;
        Ok(Self::new(config, checker, Arc::new(transport)))
    }

    pub fn engine(&self) -> &FanoutEngine {
        &self.engine
    }

    /// Spawns `concurrency` load loops and one accuracy loop.
    ///
    /// Nothing is spawned when the load configuration is infeasible. The
    /// loops never return; the set only completes if a loop panics.
    pub fn start(&self) -> Result<JoinSet<()>, RunnerError> {
        let mut generators = Vec::with_capacity(self.config.concurrency);
        for id in 0..self.config.concurrency {
            generators.push(LoadGenerator::new(
                id,
                &self.config,
                Arc::clone(&self.checker),
                self.engine.clone(),
                StdRng::from_entropy(),
            )?);
        }

        info!(
            concurrency = self.config.concurrency,
            endpoints = self.config.endpoints.len(),
            "query load configured"
        );

        let mut loops = JoinSet::new();
        for generator in generators {
            loops.spawn(generator.run());
        }

        let accuracy = AccuracyChecker::new(
            &self.config,
            Arc::clone(&self.checker),
            self.engine.clone(),
            StdRng::from_entropy(),
        );
        loops.spawn(accuracy.run());

        Ok(loops)
    }
}
