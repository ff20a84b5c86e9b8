// Per-key counters accumulated over one window.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::Key;

/// Status codes below 400 count as success.
pub fn is_success(status_code: u16) -> bool {
    status_code < 400
}

/// The mapper's output for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialStat {
    pub success: bool,
    pub status_code: u16,
    /// Seconds.
    pub response_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub total_requests: u64,
    pub total_failures: u64,
    pub status_code_histogram: BTreeMap<u16, u64>,
    /// Sum of response times, in seconds.
    pub total_response_time: f64,
}

impl Aggregate {
    /// Folds one partial stat into the running counters.
    pub fn record(&mut self, stat: &PartialStat) {
        self.total_requests += 1;
        if !stat.success {
            self.total_failures += 1;
        }
        *self.status_code_histogram.entry(stat.status_code).or_insert(0) += 1;
        self.total_response_time += stat.response_time;
    }

    pub fn total_successes(&self) -> u64 {
        self.total_requests - self.total_failures
    }

    /// Mean response time in seconds; 0 for an empty aggregate.
    pub fn mean_response_time(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_response_time / self.total_requests as f64
    }
}

/// Everything one window accumulated, keyed by bucket.
pub type WindowAggregates = HashMap<Key, Aggregate>;
