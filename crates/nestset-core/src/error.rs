use crate::{config::ConfigError, store::StoreError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// TreeError
///
/// Runtime error raised by tree operations.
/// Argument, placement, and operation errors are detected before any write.
/// Anything that fails inside a transaction surfaces as `TransactionFailure`
/// after the transaction has been rolled back.
///

#[derive(Debug, ThisError)]
pub enum TreeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("transaction failed during {operation}: {source}")]
    TransactionFailure {
        operation: &'static str,
        #[source]
        source: Box<Self>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TreeError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn invalid_placement(message: impl Into<String>) -> Self {
        Self::InvalidPlacement(message.into())
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Wrap a failure raised inside a transaction; nested failures keep the
    /// innermost operation label.
    pub(crate) fn transaction(operation: &'static str, source: Self) -> Self {
        match source {
            err @ Self::TransactionFailure { .. } => err,
            err => Self::TransactionFailure {
                operation,
                source: Box::new(err),
            },
        }
    }

    /// Node has not been assigned an identifier by the store yet.
    pub(crate) fn unmanaged() -> Self {
        Self::invalid_argument("node is not managed by the store")
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument(_) => ErrorClass::InvalidArgument,
            Self::InvalidPlacement(_) => ErrorClass::InvalidPlacement,
            Self::InvalidOperation(_) => ErrorClass::InvalidOperation,
            Self::TransactionFailure { .. } => ErrorClass::TransactionFailure,
            Self::Store(_) => ErrorClass::Store,
            Self::Config(_) => ErrorClass::Config,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::InvalidArgument(_) | Self::InvalidOperation(_) => ErrorOrigin::Tree,
            Self::InvalidPlacement(_) => ErrorOrigin::Index,
            Self::TransactionFailure { .. } => ErrorOrigin::Commit,
            Self::Store(_) => ErrorOrigin::Store,
            Self::Config(_) => ErrorOrigin::Config,
        }
    }

    /// Innermost cause for transaction failures, `self` otherwise.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::TransactionFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    InvalidArgument,
    InvalidPlacement,
    InvalidOperation,
    TransactionFailure,
    Store,
    Config,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidPlacement => "invalid_placement",
            Self::InvalidOperation => "invalid_operation",
            Self::TransactionFailure => "transaction_failure",
            Self::Store => "store",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Tree,
    Index,
    Commit,
    Store,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Tree => "tree",
            Self::Index => "index",
            Self::Commit => "commit",
            Self::Store => "store",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_wrapping_keeps_innermost_operation() {
        let inner = TreeError::transaction("shift", TreeError::invalid_argument("bad"));
        let outer = TreeError::transaction("remove", inner);

        match &outer {
            TreeError::TransactionFailure { operation, .. } => assert_eq!(*operation, "shift"),
            other => panic!("expected transaction failure, got {other:?}"),
        }
        assert_eq!(outer.class(), ErrorClass::TransactionFailure);
        assert_eq!(outer.root_cause().class(), ErrorClass::InvalidArgument);
    }

    #[test]
    fn store_errors_keep_store_origin() {
        let err = TreeError::from(StoreError::NoTransaction);

        assert_eq!(err.origin(), ErrorOrigin::Store);
        assert_eq!(err.class().to_string(), "store");
    }
}
