//! Logging initialization.

use querybench_core::LoggingConfig;
use tracing_subscriber::EnvFilter;

use crate::error::RunnerError;

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), RunnerError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder
            .with_file(true)
            .with_line_number(true)
            .try_init(),
    };

    result.map_err(|e| RunnerError::Logging(e.to_string()))
}
