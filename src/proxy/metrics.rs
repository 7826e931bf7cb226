//! Request and provider-call metrics
//!
//! The dispatch core reports through [`MetricsRecorder`]; [`InMemoryMetrics`]
//! aggregates counts and durations per label set and renders a JSON snapshot
//! for `GET /metrics`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOperation {
    Generate,
    Stream,
}

impl ProviderOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Stream => "stream",
        }
    }
}

/// Outcome label for a successful provider call
pub const OUTCOME_SUCCESS: &str = "success";

/// Sink for metrics events emitted by middleware and the orchestrator
pub trait MetricsRecorder: Send + Sync {
    fn record_request(&self, method: &str, path: &str, status: u16, duration: Duration);

    fn record_provider_call(
        &self,
        provider: &str,
        operation: ProviderOperation,
        outcome: &str,
        duration: Duration,
    );
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RequestLabels {
    method: String,
    path: String,
    status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ProviderLabels {
    provider: String,
    operation: ProviderOperation,
    outcome: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub count: u64,
    pub total_seconds: f64,
}

impl Aggregate {
    fn observe(&mut self, duration: Duration) {
        self.count += 1;
        self.total_seconds += duration.as_secs_f64();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetric {
    pub method: String,
    pub path: String,
    pub status: u16,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCallMetric {
    pub provider: String,
    pub operation: ProviderOperation,
    pub outcome: String,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

/// Point-in-time copy of every aggregate, ordered by labels
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub http_requests: Vec<RequestMetric>,
    pub provider_calls: Vec<ProviderCallMetric>,
}

#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    requests: Mutex<BTreeMap<RequestLabels, Aggregate>>,
    provider_calls: Mutex<BTreeMap<ProviderLabels, Aggregate>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let http_requests = self
            .requests
            .lock()
            .iter()
            .map(|(labels, aggregate)| RequestMetric {
                method: labels.method.clone(),
                path: labels.path.clone(),
                status: labels.status,
                aggregate: *aggregate,
            })
            .collect();

        let provider_calls = self
            .provider_calls
            .lock()
            .iter()
            .map(|(labels, aggregate)| ProviderCallMetric {
                provider: labels.provider.clone(),
                operation: labels.operation,
                outcome: labels.outcome.clone(),
                aggregate: *aggregate,
            })
            .collect();

        MetricsSnapshot {
            http_requests,
            provider_calls,
        }
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn record_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let labels = RequestLabels {
            method: method.to_string(),
            path: path.to_string(),
            status,
        };
        self.requests.lock().entry(labels).or_default().observe(duration);
    }

    fn record_provider_call(
        &self,
        provider: &str,
        operation: ProviderOperation,
        outcome: &str,
        duration: Duration,
    ) {
        let labels = ProviderLabels {
            provider: provider.to_string(),
            operation,
            outcome: outcome.to_string(),
        };
        self.provider_calls
            .lock()
            .entry(labels)
            .or_default()
            .observe(duration);
    }
}
