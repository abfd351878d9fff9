use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use humantime_serde::re::humantime;
use querybench::{telemetry, QueryExecutor, RunnerError};
use querybench_core::{BenchConfig, MemoryChecker};
use querybench_query::{FanoutMode, QueryBuilder, QueryWindow};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "querybench")]
#[command(about = "Query load generator and replica consistency checker", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "QUERYBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Query endpoint, repeat for every replica (overrides the config file)
    #[arg(long = "endpoint", global = true)]
    endpoints: Vec<String>,

    /// Number of concurrent load loops
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Log every request and response body
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the load and accuracy loops until interrupted
    Run,

    /// Send a single query to every endpoint and compare the answers
    Probe {
        /// Host to select (uses the configured labels and aggregation)
        #[arg(long, conflicts_with = "query", required_unless_present = "query")]
        host: Option<String>,

        /// Raw PromQL query to send verbatim
        #[arg(long)]
        query: Option<String>,

        /// Query time range (e.g. "5m")
        #[arg(long, value_parser = humantime::parse_duration)]
        range: Option<Duration>,

        /// Query resolution step (e.g. "10s")
        #[arg(long, value_parser = humantime::parse_duration)]
        step: Option<Duration>,
    },

    /// Generate a configuration file template
    GenerateConfig {
        /// Output configuration file path
        #[arg(long, default_value = "querybench.toml")]
        output: PathBuf,
    },
}

const CONFIG_TEMPLATE: &str = include_str!("../querybench.example.toml");

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "querybench terminated with error");
            eprintln!("querybench: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode, RunnerError> {
    if let Commands::GenerateConfig { output } = &cli.command {
        std::fs::write(output, CONFIG_TEMPLATE)?;
        println!("Configuration template written to: {}", output.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = BenchConfig::load(cli.config.clone())?;
    if !cli.endpoints.is_empty() {
        config.endpoints = cli.endpoints.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.debug {
        config.debug = true;
    }
    config.validate()?;

    telemetry::init_logging(&config.logging)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Probe {
            host,
            query,
            range,
            step,
        } => probe(config, host, query, range, step).await,
        Commands::GenerateConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

async fn run(config: BenchConfig) -> Result<ExitCode, RunnerError> {
    let checker = Arc::new(MemoryChecker::from_config(&config));
    info!(
        hosts = checker.len(),
        datapoints = config.datapoints.len(),
        "checker seeded"
    );
    if config.datapoints.is_empty() {
        warn!("no seed datapoints configured, accuracy checks will not find matches");
    }

    let executor = QueryExecutor::from_config(config, checker)?;
    let mut loops = executor.start()?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
        Some(joined) = loops.join_next() => {
            error!(result = ?joined, "driver loop exited unexpectedly");
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn probe(
    config: BenchConfig,
    host: Option<String>,
    query: Option<String>,
    range: Option<Duration>,
    step: Option<Duration>,
) -> Result<ExitCode, RunnerError> {
    let query = match query {
        Some(query) => query,
        None => QueryBuilder::new(&config.labels, config.aggregation())
            .single_host(host.as_deref().unwrap_or_default())?,
    };

    let window = QueryWindow::now(
        range.unwrap_or(config.accuracy_range),
        step.unwrap_or(config.accuracy_step),
    );

    let checker = Arc::new(MemoryChecker::new());
    let executor = QueryExecutor::from_config(config, checker)?;
    let endpoints = executor.engine().endpoints().len();

    println!("Probing {endpoints} endpoint(s) with: {query}");
    let result = executor
        .engine()
        .fanout_window(&query, window, FanoutMode::CompareResults)
        .await;

    for (index, payload) in result.payloads.iter().enumerate() {
        println!("  payload {index}: {} bytes", payload.len());
    }

    match result.error {
        None => {
            println!("All {} payload(s) identical", result.payloads.len());
            Ok(ExitCode::SUCCESS)
        }
        Some(err) => {
            println!("Probe failed: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
