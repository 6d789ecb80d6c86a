use crate::{
    node::{NodeId, Row},
    value::Value,
};
use std::{
    cmp::Ordering,
    ops::{BitAnd, BitOr, Not},
};

///
/// Predicate AST
///
/// Row filter the engine hands to the store adapter. Adapters may translate
/// it into their own query language; `eval` is the reference semantics.
///
/// - comparisons against a missing or null field never match
/// - comparisons between different value kinds never match
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    const fn matches(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord.is_eq(),
            Self::Ne => ord.is_ne(),
            Self::Lt => ord.is_lt(),
            Self::Lte => ord.is_le(),
            Self::Gt => ord.is_gt(),
            Self::Gte => ord.is_ge(),
        }
    }
}

///
/// Operand
///
/// Right-hand side of a comparison: a literal, or another integer field of
/// the same row plus an offset (`rgt = lft + 1`).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Value(Value),
    Field { field: String, offset: i64 },
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComparePredicate {
    pub field: String,
    pub op: CompareOp,
    pub operand: Operand,
}

///
/// Predicate
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(ComparePredicate),
    IsNull { field: String },
    IsNotNull { field: String },
    IdEq(NodeId),
    IdIn(Vec<NodeId>),
}

impl Predicate {
    fn compare(field: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate {
            field: field.to_string(),
            op,
            operand: Operand::Value(value.into()),
        })
    }

    #[must_use]
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    #[must_use]
    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    #[must_use]
    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    #[must_use]
    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    #[must_use]
    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    /// Compare `field` against another field of the same row plus `offset`.
    #[must_use]
    pub fn field_cmp(field: &str, op: CompareOp, other: &str, offset: i64) -> Self {
        Self::Compare(ComparePredicate {
            field: field.to_string(),
            op,
            operand: Operand::Field {
                field: other.to_string(),
                offset,
            },
        })
    }

    #[must_use]
    pub fn is_null(field: &str) -> Self {
        Self::IsNull {
            field: field.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_null(field: &str) -> Self {
        Self::IsNotNull {
            field: field.to_string(),
        }
    }

    /// Equality against a nullable reference: `None` becomes `is_null`.
    #[must_use]
    pub fn eq_ref(field: &str, id: Option<NodeId>) -> Self {
        match id {
            Some(id) => Self::eq(field, id),
            None => Self::is_null(field),
        }
    }

    /// Evaluate this predicate against a single row.
    #[must_use]
    pub fn eval(&self, row: &Row) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::And(children) => children.iter().all(|child| child.eval(row)),
            Self::Or(children) => children.iter().any(|child| child.eval(row)),
            Self::Not(inner) => !inner.eval(row),
            Self::Compare(cmp) => eval_compare(row, cmp),
            Self::IsNull { field } => row.get(field).is_none_or(Value::is_null),
            Self::IsNotNull { field } => row.get(field).is_some_and(|v| !v.is_null()),
            Self::IdEq(id) => row.id == *id,
            Self::IdIn(ids) => ids.contains(&row.id),
        }
    }
}

fn eval_compare(row: &Row, cmp: &ComparePredicate) -> bool {
    let Some(actual) = row.get(&cmp.field) else {
        return false;
    };

    let expected = match &cmp.operand {
        Operand::Value(value) => value.clone(),
        Operand::Field { field, offset } => match row.int(field) {
            Some(base) => Value::Int(base + offset),
            None => return false,
        },
    };

    actual
        .strict_cmp(&expected)
        .is_some_and(|ord| cmp.op.matches(ord))
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::True, other) | (other, Self::True) => other,
            (Self::And(mut preds), rhs) => {
                preds.push(rhs);
                Self::And(preds)
            }
            (lhs, rhs) => Self::And(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

impl Not for Predicate {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Fields;

    fn row(id: u64, pairs: &[(&str, Value)]) -> Row {
        let fields = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect::<Fields>();
        Row::new(NodeId::new(id), fields)
    }

    #[test]
    fn field_operand_matches_leaf_rows() {
        let leaf = Predicate::field_cmp("rgt", CompareOp::Eq, "lft", 1);

        assert!(leaf.eval(&row(1, &[("lft", Value::Int(2)), ("rgt", Value::Int(3))])));
        assert!(!leaf.eval(&row(2, &[("lft", Value::Int(2)), ("rgt", Value::Int(9))])));
        assert!(!leaf.eval(&row(3, &[("rgt", Value::Int(3))])));
    }

    #[test]
    fn null_and_missing_fields_never_compare() {
        let pred = Predicate::ne("parent", NodeId::new(1));

        assert!(!pred.eval(&row(1, &[("parent", Value::Null)])));
        assert!(!pred.eval(&row(2, &[])));
        assert!(Predicate::is_null("parent").eval(&row(3, &[])));
        assert!(Predicate::is_null("parent").eval(&row(4, &[("parent", Value::Null)])));
    }

    #[test]
    fn bitand_flattens_and_drops_true() {
        let pred = Predicate::True & Predicate::gt("lft", 1i64) & Predicate::lt("rgt", 10i64);

        assert_eq!(
            pred,
            Predicate::And(vec![Predicate::gt("lft", 1i64), Predicate::lt("rgt", 10i64)])
        );
    }

    #[test]
    fn eq_ref_maps_none_to_is_null() {
        assert_eq!(Predicate::eq_ref("root", None), Predicate::is_null("root"));
        assert!(Predicate::eq_ref("root", Some(NodeId::new(5)))
            .eval(&row(9, &[("root", Value::Id(NodeId::new(5)))])));
    }

    #[test]
    fn not_negates_and_unwraps_double_negation() {
        let outside = !(Predicate::gte("lft", 2i64) & Predicate::lte("rgt", 5i64));
        let r = row(1, &[("lft", Value::Int(6)), ("rgt", Value::Int(7))]);

        assert!(outside.eval(&r));
        assert_eq!(!!Predicate::IdEq(NodeId::new(1)), Predicate::IdEq(NodeId::new(1)));
        assert!(!(!Predicate::IdIn(vec![NodeId::new(1)])).eval(&r));
    }
}
