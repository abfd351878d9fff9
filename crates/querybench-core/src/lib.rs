//! Core domain types shared by the querybench crates.

pub mod checker;
pub mod config;
pub mod datapoint;

pub use checker::{Checker, MemoryChecker};
pub use config::{BenchConfig, ConfigError, LoggingConfig, SeedDatapoint, SERIES_PER_HOST};
pub use datapoint::{Datapoint, Datapoints};
