//! 遥测模块：可注入的指标上报器与请求级追踪上下文（不使用全局单例）。
//!
//! Telemetry capabilities.
//!
//! Metrics and trace propagation are handed to their users explicitly. There
//! is no process-wide registry: whoever builds the service decides which
//! reporter it gets.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MetricsReporter`] | Trait for operation counters |
//! | [`NoopMetrics`] | Default reporter (no collection) |
//! | [`InMemoryMetrics`] | Counter map for tests and the demo binary |
//! | [`CompositeMetrics`] | Fan-out to several reporters |
//! | [`CallContext`] | Request-scoped trace carrier |

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Counted operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Remove,
    List,
}

pub trait MetricsReporter: Send + Sync {
    fn increment(&self, op: Operation, value: u64, handler: &str);
}

pub struct NoopMetrics;

impl MetricsReporter for NoopMetrics {
    fn increment(&self, _op: Operation, _value: u64, _handler: &str) {}
}

/// In-memory counters keyed by operation and handler name.
#[derive(Default)]
pub struct InMemoryMetrics {
    counters: RwLock<HashMap<(Operation, String), u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, op: Operation, handler: &str) -> u64 {
        self.counters
            .read()
            .ok()
            .and_then(|c| c.get(&(op, handler.to_string())).copied())
            .unwrap_or(0)
    }

    /// Sum over every handler.
    pub fn total(&self, op: Operation) -> u64 {
        self.counters
            .read()
            .map(|c| {
                c.iter()
                    .filter(|((o, _), _)| *o == op)
                    .map(|(_, v)| *v)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<(Operation, String), u64> {
        self.counters
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl MetricsReporter for InMemoryMetrics {
    fn increment(&self, op: Operation, value: u64, handler: &str) {
        if let Ok(mut counters) = self.counters.write() {
            *counters.entry((op, handler.to_string())).or_insert(0) += value;
        }
    }
}

/// Composite reporter for multiple destinations.
#[derive(Default)]
pub struct CompositeMetrics {
    reporters: Vec<Arc<dyn MetricsReporter>>,
}

impl CompositeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl MetricsReporter for CompositeMetrics {
    fn increment(&self, op: Operation, value: u64, handler: &str) {
        for r in &self.reporters {
            r.increment(op, value, handler);
        }
    }
}

/// Request-scoped call context.
///
/// Carries only the propagated trace headers of the incoming call; storage,
/// producers and other collaborators are passed to constructors instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub trace: BTreeMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trace.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_metrics() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(Operation::Create, 1, "create");
        metrics.increment(Operation::Create, 3, "multi_create");
        metrics.increment(Operation::Create, 1, "create");

        assert_eq!(metrics.get(Operation::Create, "create"), 2);
        assert_eq!(metrics.get(Operation::Create, "multi_create"), 3);
        assert_eq!(metrics.total(Operation::Create), 5);
        assert_eq!(metrics.total(Operation::Remove), 0);
        assert_eq!(metrics.snapshot().len(), 2);
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(InMemoryMetrics::new());
        let b = Arc::new(InMemoryMetrics::new());
        let composite = CompositeMetrics::new()
            .add_reporter(a.clone())
            .add_reporter(b.clone())
            .add_reporter(Arc::new(NoopMetrics));

        composite.increment(Operation::List, 1, "list");
        assert_eq!(a.get(Operation::List, "list"), 1);
        assert_eq!(b.get(Operation::List, "list"), 1);
    }

    #[test]
    fn test_call_context_headers() {
        let ctx = CallContext::new().with_trace_header("uber-trace-id", "1:2:0:1");
        assert_eq!(ctx.trace.get("uber-trace-id").map(String::as_str), Some("1:2:0:1"));
    }
}
