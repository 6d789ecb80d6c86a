use crate::obs::sink::OpKind;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for tree operations.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub operations: BTreeMap<String, OpCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Bound maintenance
    pub shift_calls: u64,
    pub bounds_shifted: u64,

    // Rows touched
    pub rows_inserted: u64,
    pub rows_deleted: u64,
    pub nodes_recovered: u64,

    // Transactions
    pub tx_committed: u64,
    pub tx_rolled_back: u64,

    // Validation
    pub violations_found: u64,
}

///
/// OpCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OpCounters {
    pub calls: u64,
    pub failures: u64,
    pub rows_touched: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters (useful in tests).
pub fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Per-operation counter entry, created on first use.
pub(crate) fn op_entry(m: &mut EventState, kind: OpKind) -> &mut OpCounters {
    m.operations.entry(kind.label().to_string()).or_default()
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventOps,
    pub operations: Vec<OpSummary>,
}

///
/// OpSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OpSummary {
    pub operation: String,
    pub calls: u64,
    pub failures: u64,
    pub rows_touched: u64,
    pub avg_rows_per_call: f64,
}

/// Build a metrics report from in-memory counters.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let operations = snap
        .operations
        .iter()
        .map(|(operation, c)| OpSummary {
            operation: operation.clone(),
            calls: c.calls,
            failures: c.failures,
            rows_touched: c.rows_touched,
            avg_rows_per_call: if c.calls > 0 {
                c.rows_touched as f64 / c.calls as f64
            } else {
                0.0
            },
        })
        .collect();

    EventReport {
        counters: snap.ops,
        operations,
    }
}
