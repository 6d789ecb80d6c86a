//! Node store contract.
//!
//! The engine never talks to storage directly; every read and write goes
//! through `NodeStore`. Adapters own their query language, identity caching,
//! and transaction primitives. The engine relies only on:
//! - predicate-filtered fetch/update/delete
//! - scoped begin/commit/rollback
//! - an eviction hook for rows deleted behind the caller's back

mod memory;
mod predicate;


pub use memory::MemoryStore;
pub use predicate::{CompareOp, ComparePredicate, Operand, Predicate};

use crate::{
    node::{Fields, NodeId, Row},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("no transaction is open")]
    NoTransaction,

    #[error("field '{field}' on row [{id}] is not an integer")]
    NotAnInteger { id: NodeId, field: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

///
/// Direction
///
/// Sort direction for ordered fetches.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

///
/// OrderBy
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    #[must_use]
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Asc,
        }
    }

    #[must_use]
    pub fn new(field: &str, direction: Direction) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }
}

///
/// AssignOp
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AssignOp {
    Set(Value),
    /// Add to an integer field in place; null or missing fields are skipped.
    Add(i64),
}

///
/// Assignment
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub op: AssignOp,
}

impl Assignment {
    #[must_use]
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: AssignOp::Set(value.into()),
        }
    }

    #[must_use]
    pub fn add(field: &str, delta: i64) -> Self {
        Self {
            field: field.to_string(),
            op: AssignOp::Add(delta),
        }
    }
}

///
/// NodeStore
///
/// Row store the engine runs against. Every multi-step engine operation
/// brackets its writes in `begin_transaction` and exactly one of `commit` or
/// `rollback`.
///

pub trait NodeStore {
    /// Fetch matching rows in the requested order; ties break on id.
    fn fetch(&self, predicate: &Predicate, order: &[OrderBy]) -> Result<Vec<Row>, StoreError>;

    fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        Ok(self.fetch(predicate, &[])?.len() as u64)
    }

    /// Apply `assignments` to every matching row without hydrating it.
    /// Returns the number of rows touched.
    fn bulk_update(
        &mut self,
        predicate: &Predicate,
        assignments: &[Assignment],
    ) -> Result<u64, StoreError>;

    fn insert(&mut self, fields: Fields) -> Result<NodeId, StoreError>;

    fn delete(&mut self, predicate: &Predicate) -> Result<u64, StoreError>;

    fn begin_transaction(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Invalidate any cached in-memory representation of `id`.
    fn evict(&mut self, _id: NodeId) {}

    /// True when rows of this store carry `field`; used to validate sorts.
    fn has_field(&self, field: &str) -> bool;
}
