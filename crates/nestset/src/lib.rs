//! Nestset: nested-set index maintenance for hierarchical rows stored in
//! flat tables.
//!
//! ## Crate layout
//! - `core`: the engine (store contract, index strategy, tree repository,
//!   validator, recoverer, observability).
//! - `error`: the stable public error taxonomy.
//!
//! The `prelude` module carries the types most callers need to bind a store
//! and run tree operations.

pub use nestset_core as core;

pub mod error;

pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        core::{
            prelude::*,
            recover::{RecoverOptions, RecoveryReport},
            store::{Direction, MemoryStore, NodeStore, OrderBy},
            tree::{Anchor, ChildrenOptions, PathOptions, PlacementTicket, ReorderOptions},
            verify::VerifyOptions,
        },
        error::{Error, ErrorKind},
    };
}
