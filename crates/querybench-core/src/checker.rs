use std::collections::HashMap;

use parking_lot::RwLock;

use crate::config::BenchConfig;
use crate::datapoint::{Datapoint, Datapoints};

/// Source of truth for which hosts exist and what was written for them.
///
/// Implementations are shared by every driver loop, so both calls must be
/// cheap and safe to invoke concurrently. Results may change between calls.
pub trait Checker: Send + Sync {
    /// Currently known host names. May be empty.
    fn host_names(&self) -> Vec<String>;

    /// Ground-truth samples for `host`, ascending by timestamp. May be empty.
    fn datapoints(&self, host: &str) -> Datapoints;
}

/// In-memory checker fed by whatever tracks the write side.
#[derive(Debug, Default)]
pub struct MemoryChecker {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    // Insertion order is kept so host_names() is stable between calls.
    hosts: Vec<String>,
    datapoints: HashMap<String, Datapoints>,
}

impl MemoryChecker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a checker that already knows about `hosts`.
    #[must_use]
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let checker = Self::new();
        for host in hosts {
            checker.add_host(host);
        }
        checker
    }

    /// Seeds a checker with the configured hosts and datapoints.
    ///
    /// Without seeded datapoints every accuracy check fails to match, so a
    /// deployment validating real writes should feed the checker from the
    /// write side instead.
    #[must_use]
    pub fn from_config(config: &BenchConfig) -> Self {
        let checker = Self::with_hosts(config.hosts.iter().cloned());
        for seed in &config.datapoints {
            checker.record(&seed.host, Datapoint::new(seed.timestamp, seed.value));
        }
        checker
    }

    /// Registers a host. Returns false if it was already known.
    pub fn add_host(&self, host: impl Into<String>) -> bool {
        let host = host.into();
        let mut inner = self.inner.write();
        if inner.datapoints.contains_key(&host) {
            return false;
        }
        inner.datapoints.insert(host.clone(), Vec::new());
        inner.hosts.push(host);
        true
    }

    /// Forgets a host and everything recorded for it.
    pub fn remove_host(&self, host: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.datapoints.remove(host).is_none() {
            return false;
        }
        inner.hosts.retain(|h| h != host);
        true
    }

    /// Records a written sample, registering the host if needed.
    pub fn record(&self, host: &str, datapoint: Datapoint) {
        let mut inner = self.inner.write();
        if !inner.datapoints.contains_key(host) {
            inner.hosts.push(host.to_string());
        }
        inner
            .datapoints
            .entry(host.to_string())
            .or_default()
            .push(datapoint);
    }

    pub fn len(&self) -> usize {
        self.inner.read().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Checker for MemoryChecker {
    fn host_names(&self) -> Vec<String> {
        self.inner.read().hosts.clone()
    }

    fn datapoints(&self, host: &str) -> Datapoints {
        self.inner
            .read()
            .datapoints
            .get(host)
            .cloned()
            .unwrap_or_default()
    }
}
