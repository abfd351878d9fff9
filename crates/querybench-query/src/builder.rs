use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;

/// Label carrying the write-side host name of every series.
pub const HOST_LABEL: &str = "hostname";

/// Errors raised while assembling a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryBuildError {
    #[error("no hosts available to query")]
    EmptyHostPool,
}

/// Assembles PromQL selectors over write-side hosts.
///
/// Every query carries the same fixed label matchers and, when configured,
/// is wrapped in an aggregation:
///
/// ```text
/// sum({hostname=~"(host-1|host-7)",env="bench"})
/// {hostname="host-3",env="bench"}
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    labels: Vec<(String, String)>,
    aggregation: Option<String>,
}

impl QueryBuilder {
    /// Creates a builder. Labels are emitted in key order; an empty
    /// aggregation name means no wrapper.
    pub fn new(labels: &BTreeMap<String, String>, aggregation: Option<&str>) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            aggregation: aggregation.filter(|a| !a.is_empty()).map(str::to_string),
        }
    }

    /// Selects up to `count` distinct hosts from `candidates` and builds a
    /// regex matcher over them.
    ///
    /// A pool smaller than `count` selects every host once.
    pub fn multi_host<R>(
        &self,
        candidates: &[String],
        count: usize,
        rng: &mut R,
    ) -> Result<String, QueryBuildError>
    where
        R: Rng + ?Sized,
    {
        let hosts = select_hosts(candidates, count, rng)?;
        let matcher = format!("{HOST_LABEL}=~\"({})\"", hosts.join("|"));
        Ok(self.render(&matcher))
    }

    /// Builds an exact matcher for a single host.
    pub fn single_host(&self, host: &str) -> Result<String, QueryBuildError> {
        if host.is_empty() {
            return Err(QueryBuildError::EmptyHostPool);
        }
        let matcher = format!("{HOST_LABEL}=\"{host}\"");
        Ok(self.render(&matcher))
    }

    fn render(&self, host_matcher: &str) -> String {
        let mut query = String::with_capacity(64 + host_matcher.len());

        if let Some(aggregation) = &self.aggregation {
            query.push_str(aggregation);
            query.push('(');
        }

        query.push('{');
        query.push_str(host_matcher);
        for (name, value) in &self.labels {
            query.push(',');
            query.push_str(name);
            query.push_str("=\"");
            query.push_str(value);
            query.push('"');
        }
        query.push('}');

        if self.aggregation.is_some() {
            query.push(')');
        }

        query
    }
}

/// Picks `count` distinct hosts uniformly at random without replacement.
///
/// Duplicate names in `candidates` count once, so the result never repeats
/// a host even when the pool itself does.
pub fn select_hosts<'a, R>(
    candidates: &'a [String],
    count: usize,
    rng: &mut R,
) -> Result<Vec<&'a str>, QueryBuildError>
where
    R: Rng + ?Sized,
{
    let mut seen = HashSet::with_capacity(candidates.len());
    let unique: Vec<&str> = candidates
        .iter()
        .map(String::as_str)
        .filter(|host| seen.insert(*host))
        .collect();

    if unique.is_empty() {
        return Err(QueryBuildError::EmptyHostPool);
    }

    let count = count.clamp(1, unique.len());
    Ok(unique.choose_multiple(rng, count).copied().collect())
}
