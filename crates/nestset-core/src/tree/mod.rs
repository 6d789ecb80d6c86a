//! Tree repository: the public query and mutation surface over one store.

mod mutate;
mod query;


use crate::{
    config::TreeConfig,
    error::TreeError,
    index::{IndexStrategy, Position},
    node::{Node, NodeId, Row},
    store::{NodeStore, OrderBy},
};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

///
/// PlacementTicket
///
/// Handle for a placement queued by `place` and resolved by `flush`.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct PlacementTicket(u64);

///
/// Anchor
///
/// Reference node for a placement: a stored node, or one that is itself
/// still queued.
///

#[derive(Clone, Copy, Debug, Eq, From, PartialEq)]
pub enum Anchor {
    Node(NodeId),
    Pending(PlacementTicket),
}

///
/// PendingPlacement
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingPlacement {
    pub ticket: PlacementTicket,
    pub node: Node,
    pub anchor: Option<Anchor>,
    pub position: Position,
}

///
/// MoveDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MoveDirection {
    Down,
    Up,
}

///
/// Steps
///
/// How far `move_by` shifts a node among its siblings. Counts larger than
/// the available siblings clamp to the end.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Steps {
    By(u32),
    ToEnd,
}

impl Default for Steps {
    fn default() -> Self {
        Self::By(1)
    }
}

///
/// ChildrenOptions
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChildrenOptions {
    /// Only the immediate children.
    pub direct: bool,

    /// Sort keys; empty sorts by `left`.
    pub sort: Vec<OrderBy>,

    /// Include the queried node itself.
    pub include_node: bool,
}

impl ChildrenOptions {
    #[must_use]
    pub fn direct() -> Self {
        Self {
            direct: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sorted_by(mut self, key: OrderBy) -> Self {
        self.sort.push(key);
        self
    }

    #[must_use]
    pub const fn including_node(mut self) -> Self {
        self.include_node = true;
        self
    }
}

///
/// PathOptions
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathOptions {
    pub include_node: bool,
    pub separator: String,

    /// Attribute used as each segment's label; the node id when unset.
    pub label_field: Option<String>,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            include_node: true,
            separator: " > ".to_string(),
            label_field: None,
        }
    }
}

///
/// ReorderOptions
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReorderOptions {
    /// Run the validator first and refuse to reorder an inconsistent tree.
    pub verify: bool,

    /// Also reorder grandchildren.
    pub recursive: bool,
}

impl Default for ReorderOptions {
    fn default() -> Self {
        Self {
            verify: true,
            recursive: true,
        }
    }
}

///
/// NestedTree
///
/// Repository over a `NodeStore` holding one tree or a forest.
///
/// Queries always reload the nodes they start from, so stale `Node` values
/// held by callers never skew an interval query.
///

#[derive(Debug)]
pub struct NestedTree<S: NodeStore> {
    store: S,
    config: TreeConfig,
    pending: Vec<PendingPlacement>,
    next_ticket: u64,
}

impl<S: NodeStore> NestedTree<S> {
    /// Bind a store to a validated config. Every mapped role field must
    /// exist on the store's rows.
    pub fn new(store: S, config: TreeConfig) -> Result<Self, TreeError> {
        config.validate()?;
        if let Some(missing) = config.fields.role_names().find(|f| !store.has_field(f)) {
            return Err(TreeError::invalid_argument(format!(
                "store rows have no field '{missing}'"
            )));
        }

        Ok(Self {
            store,
            config,
            pending: Vec::new(),
            next_ticket: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Direct store access. Writes made here bypass bound maintenance.
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Placements queued since the last `flush`.
    #[must_use]
    pub fn pending(&self) -> &[PendingPlacement] {
        &self.pending
    }

    /// Current state of a stored node.
    pub fn node(&self, id: NodeId) -> Result<Node, TreeError> {
        self.index().load(&self.store, id)
    }

    /// Store and config borrowed together, for passes that write through
    /// the store while reading the field map.
    pub(crate) const fn parts_mut(&mut self) -> (&mut S, &TreeConfig) {
        (&mut self.store, &self.config)
    }

    pub(crate) const fn index(&self) -> IndexStrategy<'_> {
        IndexStrategy::new(&self.config)
    }

    /// Reject sort keys naming fields the store rows do not carry.
    pub(crate) fn validate_sort(&self, sort: &[OrderBy]) -> Result<(), TreeError> {
        match sort.iter().find(|key| !self.store.has_field(&key.field)) {
            Some(key) => Err(TreeError::invalid_argument(format!(
                "Invalid sort options specified: field - {}, direction - {}",
                key.field, key.direction
            ))),
            None => Ok(()),
        }
    }

    /// Default `left` ordering, or the caller's keys once validated.
    pub(crate) fn order_or_left(&self, sort: &[OrderBy]) -> Result<Vec<OrderBy>, TreeError> {
        if sort.is_empty() {
            return Ok(vec![OrderBy::asc(&self.config.fields.left)]);
        }
        self.validate_sort(sort)?;

        Ok(sort.to_vec())
    }

    pub(crate) fn decode(&self, rows: Vec<Row>) -> Vec<Node> {
        rows.into_iter()
            .map(|row| Node::from_row(&row, &self.config.fields))
            .collect()
    }
}

pub(crate) fn require_id(node: &Node) -> Result<NodeId, TreeError> {
    node.id.ok_or_else(TreeError::unmanaged)
}
