use derive_more::Display;
use nestset_core::{
    config::ConfigError,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, TreeError},
    store::StoreError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<TreeError> for Error {
    fn from(err: TreeError) -> Self {
        let kind = match err.class() {
            ErrorClass::InvalidArgument => ErrorKind::Request(RequestErrorKind::InvalidArgument),
            ErrorClass::InvalidPlacement => ErrorKind::Request(RequestErrorKind::InvalidPlacement),
            ErrorClass::InvalidOperation => ErrorKind::Request(RequestErrorKind::InvalidOperation),
            ErrorClass::TransactionFailure => ErrorKind::Transaction,
            ErrorClass::Store => ErrorKind::Store,
            ErrorClass::Config => ErrorKind::Config,
        };

        Self::new(kind, err.origin().into(), err.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        TreeError::from(err).into()
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        TreeError::from(err).into()
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Rejected before any write; the store is unchanged.
    Request(RequestErrorKind),

    /// A multi-step write failed and was rolled back.
    Transaction,

    /// Store adapter failure outside a transaction.
    Store,

    Config,
}

///
/// RequestErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RequestErrorKind {
    /// Unknown node, bad sort field, bad label field.
    InvalidArgument,

    /// Target position is illegal for the node.
    InvalidPlacement,

    /// Operation does not apply to this tree shape.
    InvalidOperation,
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Tree,
    Index,
    Commit,
    Store,
    Config,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Tree => Self::Tree,
            CoreErrorOrigin::Index => Self::Index,
            CoreErrorOrigin::Commit => Self::Commit,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Config => Self::Config,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use nestset_core::{
        config::TreeConfig,
        index::Position,
        node::{Node, NodeId},
        store::MemoryStore,
        tree::NestedTree,
    };

    #[test]
    fn placement_errors_map_to_request_kind() {
        let config = TreeConfig::forest();
        let store = MemoryStore::for_config(&config, &[]);
        let mut tree = NestedTree::new(store, config).expect("tree should bind");
        let root = tree
            .insert(&mut Node::new(), None, Position::LastChild)
            .expect("insert should succeed");

        let err: Error = tree
            .insert(&mut Node::new(), Some(root), Position::NextSibling)
            .expect_err("sibling of a forest root should be rejected")
            .into();

        assert_eq!(
            err.kind,
            ErrorKind::Request(RequestErrorKind::InvalidPlacement)
        );
        assert_eq!(err.origin, ErrorOrigin::Index);
    }

    #[test]
    fn missing_node_maps_to_invalid_argument() {
        let config = TreeConfig::single();
        let store = MemoryStore::for_config(&config, &[]);
        let tree = NestedTree::new(store, config).expect("tree should bind");

        let err = Error::from(
            tree.node(NodeId::new(7))
                .expect_err("missing node should fail"),
        );

        assert_eq!(
            err.kind,
            ErrorKind::Request(RequestErrorKind::InvalidArgument)
        );
        assert_eq!(err.message, "invalid argument: node [7] does not exist");
    }

    #[test]
    fn store_errors_map_to_store_kind() {
        let err = Error::from(StoreError::NoTransaction);

        assert_eq!(err.kind, ErrorKind::Store);
        assert_eq!(err.origin, ErrorOrigin::Store);
    }

    #[test]
    fn config_errors_map_to_config_kind() {
        let err = Error::from(
            TreeConfig::from_toml_str("[fields]\nleft = \"\"")
                .expect_err("empty field should be rejected"),
        );

        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.origin.to_string(), "Config");
    }

    #[test]
    fn error_round_trips_through_json() {
        let err = Error::new(
            ErrorKind::Transaction,
            ErrorOrigin::Commit,
            "transaction failed during move: store backend failure: disk",
        );

        let json = serde_json::to_string(&err).expect("error should serialize");
        let back: Error = serde_json::from_str(&json).expect("error should deserialize");

        assert_eq!(back.kind, ErrorKind::Transaction);
        assert_eq!(back.origin, ErrorOrigin::Commit);
        assert_eq!(back.to_string(), err.message);
    }
}
