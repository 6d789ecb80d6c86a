//! Core runtime for Nestset: the nested-set index engine, the store contract
//! it runs against, the validator, the recoverer, and observability hooks.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod commit;
pub mod config;
pub mod error;
pub mod index;
pub mod node;
pub mod obs;
pub mod recover;
pub mod store;
pub mod tree;
pub mod value;
pub mod verify;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Sentinel `left` value carried by a node that has been placed but whose
/// bounds have not been resolved yet.
pub const PENDING_LEFT: i64 = 0;

/// Default level assigned to root nodes when no base level is configured.
pub const DEFAULT_BASE_LEVEL: i64 = 0;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No stores, sinks, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        config::{FieldMap, TreeConfig},
        index::Position,
        node::{Node, NodeId},
        tree::{MoveDirection, NestedTree, Steps},
        value::Value,
        verify::{Verification, Violation},
    };
}
