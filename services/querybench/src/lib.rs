//! Read-path load generation and replica consistency checking.
//!
//! [`QueryExecutor`] launches the configured number of [`LoadGenerator`]
//! loops plus a single [`AccuracyChecker`]. Both loops go through the same
//! [`FanoutEngine`](querybench_query::FanoutEngine); load loops discard what
//! comes back, the accuracy loop compares replicas and validates samples
//! against the [`Checker`](querybench_core::Checker).

pub mod accuracy;
pub mod error;
pub mod executor;
pub mod load;
pub mod outcome;
pub mod telemetry;

pub use accuracy::AccuracyChecker;
pub use error::RunnerError;
pub use executor::QueryExecutor;
pub use load::LoadGenerator;
pub use outcome::IterationOutcome;
