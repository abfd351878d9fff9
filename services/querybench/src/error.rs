use querybench_core::ConfigError;
use querybench_query::{QueryBuildError, TransportError};

/// Errors surfaced by the querybench binary.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    QueryBuild(#[from] QueryBuildError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
