//! Observability: runtime counters and sink abstractions.
//!
//! Structured diagnostics go through `tracing`; counters go through the
//! `MetricsSink` boundary in `sink`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, OpSummary};
pub use sink::{
    MetricsEvent, MetricsSink, OpKind, metrics_report, metrics_reset_all, with_metrics_sink,
};
