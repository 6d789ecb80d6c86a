//! Metrics sink boundary.
//!
//! Engine logic MUST NOT touch obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// OpKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpKind {
    Place,
    Move,
    Remove,
    Reorder,
    Verify,
    Recover,
}

impl OpKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Move => "move",
            Self::Remove => "remove",
            Self::Reorder => "reorder",
            Self::Verify => "verify",
            Self::Recover => "recover",
        }
    }
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    OpStart {
        kind: OpKind,
    },
    OpFinish {
        kind: OpKind,
        rows_touched: u64,
        failed: bool,
    },
    BoundsShifted {
        rows: u64,
    },
    RowsInserted {
        rows: u64,
    },
    RowsDeleted {
        rows: u64,
    },
    TxCommitted {
        operation: &'static str,
    },
    TxRolledBack {
        operation: &'static str,
    },
    ViolationsFound {
        count: u64,
    },
    NodesRecovered {
        count: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default process-local sink that writes into global metrics state.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::OpStart { kind } => {
                let entry = metrics::op_entry(m, kind);
                entry.calls = entry.calls.saturating_add(1);
            }
            MetricsEvent::OpFinish {
                kind,
                rows_touched,
                failed,
            } => {
                let entry = metrics::op_entry(m, kind);
                entry.rows_touched = entry.rows_touched.saturating_add(rows_touched);
                if failed {
                    entry.failures = entry.failures.saturating_add(1);
                }
            }
            MetricsEvent::BoundsShifted { rows } => {
                m.ops.shift_calls = m.ops.shift_calls.saturating_add(1);
                m.ops.bounds_shifted = m.ops.bounds_shifted.saturating_add(rows);
            }
            MetricsEvent::RowsInserted { rows } => {
                m.ops.rows_inserted = m.ops.rows_inserted.saturating_add(rows);
            }
            MetricsEvent::RowsDeleted { rows } => {
                m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(rows);
            }
            MetricsEvent::TxCommitted { .. } => {
                m.ops.tx_committed = m.ops.tx_committed.saturating_add(1);
            }
            MetricsEvent::TxRolledBack { .. } => {
                m.ops.tx_rolled_back = m.ops.tx_rolled_back.saturating_add(1);
            }
            MetricsEvent::ViolationsFound { count } => {
                m.ops.violations_found = m.ops.violations_found.saturating_add(count);
            }
            MetricsEvent::NodesRecovered { count } => {
                m.ops.nodes_recovered = m.ops.nodes_recovered.saturating_add(count);
            }
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let installed = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match installed {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
/// The previous sink is restored on every exit path, including unwind.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// Span
/// RAII guard that emits start/finish events for one tree operation.
/// A span dropped without `finish` is recorded as failed.
///

pub(crate) struct Span {
    kind: OpKind,
    rows: u64,
    finished: bool,
}

impl Span {
    #[must_use]
    pub(crate) fn new(kind: OpKind) -> Self {
        record(MetricsEvent::OpStart { kind });

        Self {
            kind,
            rows: 0,
            finished: false,
        }
    }

    pub(crate) const fn add_rows(&mut self, rows: u64) {
        self.rows = self.rows.saturating_add(rows);
    }

    pub(crate) fn finish(mut self) {
        self.finished = true;
        record(MetricsEvent::OpFinish {
            kind: self.kind,
            rows_touched: self.rows,
            failed: false,
        });
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.finished {
            record(MetricsEvent::OpFinish {
                kind: self.kind,
                rows_touched: self.rows,
                failed: true,
            });
        }
    }
}

///
/// TESTS
///
