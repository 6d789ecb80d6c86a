use crate::{PENDING_LEFT, config::FieldMap, value::Value};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physical field values of one row, keyed by field name.
pub type Fields = BTreeMap<String, Value>;

///
/// NodeId
///
/// Store-assigned row identifier.
///

#[derive(
    Clone,
    Copy,
    Debug,
    Deref,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct NodeId(u64);

impl NodeId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// Row
///
/// Untyped row as the store adapter sees it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Row {
    pub id: NodeId,
    pub fields: Fields,
}

impl Row {
    #[must_use]
    pub const fn new(id: NodeId, fields: Fields) -> Self {
        Self { id, fields }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Read an integer field; `None` when missing, null, or not an integer.
    #[must_use]
    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    /// Read a reference field; `None` when missing, null, or not an id.
    #[must_use]
    pub fn id_ref(&self, field: &str) -> Option<NodeId> {
        self.get(field).and_then(Value::as_id)
    }
}

///
/// Node
///
/// Typed view of a tree row, decoded through a `FieldMap`.
///
/// `id` is `None` until the store has assigned one. Missing bound fields
/// decode as `0`, which is never a valid bound.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Node {
    pub id: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub level: Option<i64>,
    pub root: Option<NodeId>,
    pub attrs: Fields,
}

impl Node {
    /// Create an unsaved node with no bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attr(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn attr(&self, field: &str) -> Option<&Value> {
        self.attrs.get(field)
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.right == self.left + 1
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.id.is_none() && self.left == PENDING_LEFT
    }

    /// Number of bound slots this node's subtree occupies.
    #[must_use]
    pub const fn span(&self) -> i64 {
        self.right - self.left + 1
    }

    /// True when `other` lies inside this node's interval (or is this node).
    #[must_use]
    pub const fn encloses(&self, other: &Self) -> bool {
        self.left <= other.left && other.right <= self.right
    }

    /// Decode a row using the configured field roles.
    #[must_use]
    pub fn from_row(row: &Row, fields: &FieldMap) -> Self {
        let mut attrs = row.fields.clone();
        for role in fields.role_names() {
            attrs.remove(role);
        }

        Self {
            id: Some(row.id),
            parent: row.id_ref(&fields.parent),
            left: row.int(&fields.left).unwrap_or_default(),
            right: row.int(&fields.right).unwrap_or_default(),
            level: fields.level.as_deref().and_then(|f| row.int(f)),
            root: fields.root.as_deref().and_then(|f| row.id_ref(f)),
            attrs,
        }
    }

    /// Encode this node into physical fields. Unconfigured roles are skipped.
    #[must_use]
    pub fn to_fields(&self, fields: &FieldMap) -> Fields {
        let mut out = self.attrs.clone();
        out.insert(fields.parent.clone(), self.parent.into());
        out.insert(fields.left.clone(), Value::Int(self.left));
        out.insert(fields.right.clone(), Value::Int(self.right));
        if let Some(level) = &fields.level {
            out.insert(level.clone(), self.level.into());
        }
        if let Some(root) = &fields.root {
            out.insert(root.clone(), self.root.into());
        }

        out
    }
}

///
/// TESTS
///
