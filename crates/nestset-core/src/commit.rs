//! Transaction scope for multi-step tree mutations.
//!
//! Every operation that issues more than one write runs through
//! `run_in_transaction`. The guard owns the store borrow for the duration of
//! the operation and always leaves the store with the transaction closed:
//! committed on success, rolled back on error or unwind.

use crate::{
    error::TreeError,
    obs::sink::{self, MetricsEvent},
    store::NodeStore,
};
use std::fmt;
use tracing::{debug, trace, warn};

///
/// TxPhase
///
/// `Idle → Open → {Shifting, Reparenting} → Committed | RolledBack`
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxPhase {
    Idle,
    Open,
    Shifting,
    Reparenting,
    Committed,
    RolledBack,
}

impl TxPhase {
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Shifting | Self::Reparenting)
    }
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Shifting => "shifting",
            Self::Reparenting => "reparenting",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        write!(f, "{label}")
    }
}

///
/// Transaction
///
/// Open transaction over a borrowed store. Dropping an uncommitted guard
/// rolls the transaction back.
///

pub struct Transaction<'a, S: NodeStore + ?Sized> {
    store: &'a mut S,
    operation: &'static str,
    phase: TxPhase,
}

impl<'a, S: NodeStore + ?Sized> Transaction<'a, S> {
    /// Open a transaction; failure to begin is reported as a transaction failure.
    pub fn begin(store: &'a mut S, operation: &'static str) -> Result<Self, TreeError> {
        store
            .begin_transaction()
            .map_err(|err| TreeError::transaction(operation, err.into()))?;
        debug!(operation, "transaction opened");

        Ok(Self {
            store,
            operation,
            phase: TxPhase::Open,
        })
    }

    #[must_use]
    pub const fn phase(&self) -> TxPhase {
        self.phase
    }

    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Store handle for writes inside this transaction.
    pub fn store(&mut self) -> &mut S {
        self.store
    }

    /// Mark the current step; only valid while the transaction is active.
    pub fn enter(&mut self, phase: TxPhase) -> Result<(), TreeError> {
        if !self.phase.is_active() || !phase.is_active() {
            return Err(TreeError::invalid_operation(format!(
                "transaction '{}' cannot move from {} to {phase}",
                self.operation, self.phase
            )));
        }
        trace!(operation = self.operation, from = %self.phase, to = %phase, "transaction phase");
        self.phase = phase;

        Ok(())
    }

    pub fn commit(mut self) -> Result<(), TreeError> {
        match self.store.commit() {
            Ok(()) => {
                self.phase = TxPhase::Committed;
                debug!(operation = self.operation, "transaction committed");
                sink::record(MetricsEvent::TxCommitted {
                    operation: self.operation,
                });

                Ok(())
            }
            // the guard is still active, so Drop rolls back
            Err(err) => Err(TreeError::transaction(self.operation, err.into())),
        }
    }

    pub fn rollback(mut self) {
        self.rollback_best_effort();
    }

    fn rollback_best_effort(&mut self) {
        if self.phase.is_closed() {
            return;
        }

        if let Err(err) = self.store.rollback() {
            warn!(operation = self.operation, error = %err, "transaction rollback failed");
        } else {
            debug!(operation = self.operation, phase = %self.phase, "transaction rolled back");
        }
        self.phase = TxPhase::RolledBack;
        sink::record(MetricsEvent::TxRolledBack {
            operation: self.operation,
        });
    }
}

impl<S: NodeStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        self.rollback_best_effort();
    }
}

/// Run `f` inside one transaction.
///
/// Errors returned by `f` roll the transaction back and surface as
/// `TreeError::TransactionFailure` labelled with `operation`.
pub fn run_in_transaction<S, T, F>(
    store: &mut S,
    operation: &'static str,
    f: F,
) -> Result<T, TreeError>
where
    S: NodeStore + ?Sized,
    F: FnOnce(&mut Transaction<'_, S>) -> Result<T, TreeError>,
{
    let mut tx = Transaction::begin(store, operation)?;

    match f(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback();
            Err(TreeError::transaction(operation, err))
        }
    }
}

///
/// TESTS
///
