use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

///
/// Value
///
/// Dynamic field value stored in a row. Tree roles (bounds, level, parent,
/// root) use `Int` and `Id`; attribute fields may hold any variant.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Id(NodeId),
    Text(String),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_id(&self) -> Option<NodeId> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Variant rank used to order values of different kinds.
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Id(_) => 3,
            Self::Text(_) => 4,
        }
    }

    /// Compare two values of the same kind.
    ///
    /// Returns `None` for mixed kinds or when either side is `Null`; predicate
    /// evaluation treats that as "no match".
    #[must_use]
    pub fn strict_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Id(a), Self::Id(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order across all values, used for sorting result sets.
    /// Nulls sort first; mixed kinds sort by variant rank.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.strict_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Id(id) => write!(f, "{id}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<Option<NodeId>> for Value {
    fn from(id: Option<NodeId>) -> Self {
        id.map_or(Self::Null, Self::Id)
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map_or(Self::Null, Self::Int)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_cmp_rejects_mixed_kinds_and_nulls() {
        assert_eq!(Value::Int(1).strict_cmp(&Value::Text("1".into())), None);
        assert_eq!(Value::Null.strict_cmp(&Value::Null), None);
        assert_eq!(
            Value::Int(2).strict_cmp(&Value::Int(5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn canonical_cmp_sorts_nulls_first() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Null,
            Value::Int(3),
            Value::Text("a".into()),
        ];
        values.sort_by(Value::canonical_cmp);

        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Int(3),
                Value::Text("a".into()),
                Value::Text("b".into()),
            ]
        );
    }
}
