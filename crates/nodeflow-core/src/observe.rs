//! Observability hooks for node and flow execution.
//!
//! Engines report timing spans and numeric metrics through the [`Observer`]
//! attached to the run's [`Context`](crate::Context). Reporting is
//! fire-and-forget: nothing an observer does can influence routing.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

/// Sink for named timing spans and metrics with string tag pairs.
pub trait Observer: Send + Sync {
    /// Record a completed timing span.
    fn span(&self, name: &str, elapsed: Duration, tags: &[(&str, &str)]);
    /// Record a numeric metric sample.
    fn metric(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

fn render_tags(tags: &[(&str, &str)]) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Observer that forwards everything to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn span(&self, name: &str, elapsed: Duration, tags: &[(&str, &str)]) {
        debug!(
            span = name,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            tags = %render_tags(tags),
            "span recorded"
        );
    }

    fn metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        debug!(metric = name, value, tags = %render_tags(tags), "metric recorded");
    }
}

/// A recorded span or metric sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Span {
        name: String,
        elapsed: Duration,
        tags: Vec<(String, String)>,
    },
    Metric {
        name: String,
        value: f64,
        tags: Vec<(String, String)>,
    },
}

impl Record {
    pub fn name(&self) -> &str {
        match self {
            Record::Span { name, .. } | Record::Metric { name, .. } => name,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        let tags = match self {
            Record::Span { tags, .. } | Record::Metric { tags, .. } => tags,
        };
        tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn owned_tags(tags: &[(&str, &str)]) -> Vec<(String, String)> {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// In-memory observer for testing and local inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryObserver {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records captured so far, in emission order.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records with the given span/metric name.
    pub fn named(&self, name: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.name() == name)
            .collect()
    }

    /// Sum of all samples of a metric.
    pub fn metric_total(&self, name: &str) -> f64 {
        self.named(name)
            .iter()
            .map(|r| match r {
                Record::Metric { value, .. } => *value,
                Record::Span { .. } => 0.0,
            })
            .sum()
    }

    fn push(&self, record: Record) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl Observer for MemoryObserver {
    fn span(&self, name: &str, elapsed: Duration, tags: &[(&str, &str)]) {
        self.push(Record::Span {
            name: name.to_string(),
            elapsed,
            tags: owned_tags(tags),
        });
    }

    fn metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.push(Record::Metric {
            name: name.to_string(),
            value,
            tags: owned_tags(tags),
        });
    }
}
