//! Metrics for crane observability
//!
//! OpenTelemetry instruments on the global `crane` meter. Without an
//! installed meter provider every recording is a no-op.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("crane"));

/// Histogram of reconciliation duration
///
/// Labels:
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("crane_reconcile_duration_seconds")
        .with_description("Duration of CranePodAutoscaler reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconciliation errors
///
/// Labels:
/// - `error_type`: see `Error::kind_label`
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("crane_reconcile_errors_total")
        .with_description("Total number of CranePodAutoscaler reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Counter of scaling decisions
///
/// Labels:
/// - `strategy`: HPA, VPA
/// - `reason`: which decision rule fired
pub static SCALING_DECISIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("crane_scaling_decisions_total")
        .with_description("Total number of scaling decisions by strategy")
        .with_unit("{decisions}")
        .build()
});

/// Counter of writes to child autoscalers
///
/// Labels:
/// - `kind`: HPA, VPA
/// - `operation`: create, update
pub static CHILD_WRITES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("crane_child_writes_total")
        .with_description("Total number of child autoscaler creates and updates")
        .with_unit("{writes}")
        .build()
});

/// Gauge of the most recent worst-case utilization ratio
pub static WORST_UTILIZATION: Lazy<Gauge<f64>> = Lazy::new(|| {
    METER
        .f64_gauge("crane_worst_utilization_ratio")
        .with_description("Largest target/upperBound ratio seen on the last reconciliation")
        .with_unit("1")
        .build()
});

/// Write operations against child autoscalers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    /// Child did not exist and was created
    Create,
    /// Child spec was replaced
    Update,
}

impl WriteOperation {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Times one reconciliation
pub struct ReconcileTimer {
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "success")],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: &'static str) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "error")],
        );
        RECONCILE_ERRORS.add(1, &[KeyValue::new("error_type", error_type)]);
    }
}

/// Record a scaling decision
pub fn record_scaling_decision(strategy: &'static str, reason: &'static str) {
    SCALING_DECISIONS.add(
        1,
        &[
            KeyValue::new("strategy", strategy),
            KeyValue::new("reason", reason),
        ],
    );
}

/// Record a create or update of a child autoscaler
pub fn record_child_write(kind: &'static str, operation: WriteOperation) {
    CHILD_WRITES.add(
        1,
        &[
            KeyValue::new("kind", kind),
            KeyValue::new("operation", operation.as_str()),
        ],
    );
}

/// Update the worst utilization gauge
pub fn set_worst_utilization(ratio: f64) {
    WORST_UTILIZATION.record(ratio, &[]);
}
