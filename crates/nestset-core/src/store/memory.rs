use crate::{
    config::TreeConfig,
    node::{Fields, NodeId, Row},
    store::{AssignOp, Assignment, Direction, NodeStore, OrderBy, Predicate, StoreError},
    value::Value,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// Snapshot
///
/// Store state captured at `begin_transaction`, restored on rollback.
///

#[derive(Clone, Debug)]
struct Snapshot {
    rows: BTreeMap<NodeId, Fields>,
    next_id: u64,
}

///
/// MemoryStore
///
/// `BTreeMap`-backed reference adapter. Transactions nest: each
/// `begin_transaction` pushes a snapshot, `commit` drops it, `rollback`
/// restores it.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<NodeId, Fields>,
    next_id: u64,
    schema: BTreeSet<String>,
    snapshots: Vec<Snapshot>,
    evicted: Vec<NodeId>,
}

impl MemoryStore {
    /// Create an empty store whose rows carry the given fields.
    #[must_use]
    pub fn new<I, F>(schema: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            schema: schema.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a store with every role field of `config` plus `attrs`.
    #[must_use]
    pub fn for_config(config: &TreeConfig, attrs: &[&str]) -> Self {
        let roles = config.fields.role_names().map(str::to_string);
        let attrs = attrs.iter().map(|a| (*a).to_string());

        Self::new(roles.chain(attrs))
    }

    /// Write a row under an explicit id, bypassing id assignment.
    /// Used to seed stores with pre-existing (possibly broken) data.
    pub fn put(&mut self, id: NodeId, fields: Fields) {
        self.next_id = self.next_id.max(id.get());
        self.rows.insert(id, fields);
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<Row> {
        self.rows.get(&id).map(|fields| Row::new(id, fields.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current transaction nesting depth.
    #[must_use]
    pub const fn transaction_depth(&self) -> usize {
        self.snapshots.len()
    }

    /// Ids passed to `evict`, in call order.
    #[must_use]
    pub fn evicted(&self) -> &[NodeId] {
        &self.evicted
    }

    /// Drain the eviction log; long-lived stores call this after acting on it.
    pub fn take_evicted(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.evicted)
    }

    fn matching_ids(&self, predicate: &Predicate) -> Vec<NodeId> {
        self.rows
            .iter()
            .filter(|(id, fields)| predicate.eval(&Row::new(**id, (*fields).clone())))
            .map(|(id, _)| *id)
            .collect()
    }
}

fn apply_assignment(
    id: NodeId,
    fields: &mut Fields,
    assignment: &Assignment,
) -> Result<(), StoreError> {
    match &assignment.op {
        AssignOp::Set(value) => {
            fields.insert(assignment.field.clone(), value.clone());
        }
        AssignOp::Add(delta) => match fields.get_mut(&assignment.field) {
            Some(Value::Int(current)) => *current += delta,
            None | Some(Value::Null) => {}
            Some(_) => {
                return Err(StoreError::NotAnInteger {
                    id,
                    field: assignment.field.clone(),
                });
            }
        },
    }

    Ok(())
}

impl NodeStore for MemoryStore {
    fn fetch(&self, predicate: &Predicate, order: &[OrderBy]) -> Result<Vec<Row>, StoreError> {
        let mut rows = self
            .rows
            .iter()
            .map(|(id, fields)| Row::new(*id, fields.clone()))
            .filter(|row| predicate.eval(row))
            .collect::<Vec<_>>();

        // BTreeMap iteration is id-ordered, so a stable sort keeps id as the tiebreak.
        rows.sort_by(|a, b| {
            for key in order {
                let null = Value::Null;
                let lhs = a.get(&key.field).unwrap_or(&null);
                let rhs = b.get(&key.field).unwrap_or(&null);
                let ord = match key.direction {
                    Direction::Asc => lhs.canonical_cmp(rhs),
                    Direction::Desc => rhs.canonical_cmp(lhs),
                };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });

        Ok(rows)
    }

    fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        Ok(self.matching_ids(predicate).len() as u64)
    }

    fn bulk_update(
        &mut self,
        predicate: &Predicate,
        assignments: &[Assignment],
    ) -> Result<u64, StoreError> {
        let ids = self.matching_ids(predicate);

        // Validate every row first so a type error leaves the store untouched.
        let mut staged = Vec::with_capacity(ids.len());
        for id in &ids {
            let mut fields = self.rows.get(id).cloned().unwrap_or_default();
            for assignment in assignments {
                apply_assignment(*id, &mut fields, assignment)?;
            }
            staged.push((*id, fields));
        }

        for (id, fields) in staged {
            self.rows.insert(id, fields);
        }

        Ok(ids.len() as u64)
    }

    fn insert(&mut self, fields: Fields) -> Result<NodeId, StoreError> {
        self.next_id += 1;
        let id = NodeId::new(self.next_id);
        self.rows.insert(id, fields);

        Ok(id)
    }

    fn delete(&mut self, predicate: &Predicate) -> Result<u64, StoreError> {
        let ids = self.matching_ids(predicate);
        for id in &ids {
            self.rows.remove(id);
        }

        Ok(ids.len() as u64)
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        self.snapshots.push(Snapshot {
            rows: self.rows.clone(),
            next_id: self.next_id,
        });

        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshots
            .pop()
            .map(|_| ())
            .ok_or(StoreError::NoTransaction)
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let snapshot = self.snapshots.pop().ok_or(StoreError::NoTransaction)?;
        self.rows = snapshot.rows;
        self.next_id = snapshot.next_id;

        Ok(())
    }

    fn evict(&mut self, id: NodeId) {
        self.evicted.push(id);
    }

    fn has_field(&self, field: &str) -> bool {
        self.schema.contains(field)
    }
}
