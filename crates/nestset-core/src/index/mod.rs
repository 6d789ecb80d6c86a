//! Bound arithmetic for the nested-set index.
//!
//! All writes issued here are bulk updates: rows are never hydrated to
//! shift their bounds. Callers own the surrounding transaction.


use crate::{
    config::TreeConfig,
    error::TreeError,
    node::{Node, NodeId},
    obs::sink::{self, MetricsEvent},
    store::{Assignment, Direction, NodeStore, OrderBy, Predicate},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::trace;

///
/// Position
///
/// Where a node lands relative to its anchor.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Position {
    FirstChild,
    #[default]
    LastChild,
    NextSibling,
    PrevSibling,
}

impl Position {
    #[must_use]
    pub const fn is_sibling(self) -> bool {
        matches!(self, Self::NextSibling | Self::PrevSibling)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FirstChild => "first_child",
            Self::LastChild => "last_child",
            Self::NextSibling => "next_sibling",
            Self::PrevSibling => "prev_sibling",
        };
        write!(f, "{label}")
    }
}

impl FromStr for Position {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_child" | "FirstChild" => Ok(Self::FirstChild),
            "last_child" | "LastChild" => Ok(Self::LastChild),
            "next_sibling" | "NextSibling" => Ok(Self::NextSibling),
            "prev_sibling" | "PrevSibling" => Ok(Self::PrevSibling),
            other => Err(TreeError::invalid_argument(format!(
                "unknown position '{other}'"
            ))),
        }
    }
}

///
/// Scope
///
/// Set of rows one tree occupies. Single-tree stores have one scope; forests
/// have one per distinct `root` value.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    Store,
    Tree(Option<NodeId>),
}

///
/// Allocation
///
/// Resolved placement for a node that has not been written yet.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Allocation {
    pub parent: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub level: Option<i64>,
    pub root: Option<NodeId>,

    /// The node starts a new forest tree; its `root` is its own id, known
    /// only after insertion.
    pub new_tree: bool,
}

impl Allocation {
    /// Apply the resolved bounds to a node about to be inserted.
    pub const fn apply(&self, node: &mut Node) {
        node.parent = self.parent;
        node.left = self.left;
        node.right = self.right;
        node.level = self.level;
        node.root = self.root;
    }
}

/// Target of a relocation after anchor resolution.
#[derive(Clone, Copy, Debug)]
struct Target {
    parent: Option<NodeId>,
    start: i64,
    level: Option<i64>,
    scope: Scope,
    new_tree: bool,
}

///
/// Relocation
///
/// A validated move, produced by `plan_relocation`.
///

#[derive(Clone, Debug)]
pub struct Relocation {
    node: Node,
    target: Target,
}

impl Relocation {
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// True when the node leaves its tree to root a new one.
    #[must_use]
    pub const fn starts_new_tree(&self) -> bool {
        self.target.new_tree
    }
}

///
/// IndexStrategy
///
/// Stateless view over a `TreeConfig` that turns placement requests into
/// bulk shifts against a store.
///

#[derive(Clone, Copy, Debug)]
pub struct IndexStrategy<'a> {
    config: &'a TreeConfig,
}

impl<'a> IndexStrategy<'a> {
    #[must_use]
    pub const fn new(config: &'a TreeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &'a TreeConfig {
        self.config
    }

    /// Scope the node's tree occupies.
    #[must_use]
    pub const fn scope_of(&self, node: &Node) -> Scope {
        if self.config.is_forest() {
            Scope::Tree(node.root)
        } else {
            Scope::Store
        }
    }

    #[must_use]
    pub fn scope_predicate(&self, scope: Scope) -> Predicate {
        match (scope, &self.config.fields.root) {
            (Scope::Tree(root), Some(field)) => Predicate::eq_ref(field, root),
            _ => Predicate::True,
        }
    }

    /// Load the current state of `id` from the store.
    pub fn load<S: NodeStore + ?Sized>(&self, store: &S, id: NodeId) -> Result<Node, TreeError> {
        let row = store
            .fetch(&Predicate::IdEq(id), &[])?
            .into_iter()
            .next()
            .ok_or_else(|| TreeError::invalid_argument(format!("node [{id}] does not exist")))?;

        Ok(Node::from_row(&row, &self.config.fields))
    }

    /// Highest `right` bound in `scope`, or `0` for an empty scope.
    pub fn max_bound<S: NodeStore + ?Sized>(
        &self,
        store: &S,
        scope: Scope,
    ) -> Result<i64, TreeError> {
        let field = &self.config.fields.right;
        let pred = self.scope_predicate(scope) & Predicate::is_not_null(field);
        let rows = store.fetch(&pred, &[OrderBy::new(field, Direction::Desc)])?;

        Ok(rows.first().and_then(|row| row.int(field)).unwrap_or(0))
    }

    /// Lowest `left` bound in `scope`, or `0` for an empty scope.
    pub fn min_bound<S: NodeStore + ?Sized>(
        &self,
        store: &S,
        scope: Scope,
    ) -> Result<i64, TreeError> {
        let field = &self.config.fields.left;
        let pred = self.scope_predicate(scope) & Predicate::is_not_null(field);
        let rows = store.fetch(&pred, &[OrderBy::asc(field)])?;

        Ok(rows.first().and_then(|row| row.int(field)).unwrap_or(0))
    }

    /// Add `delta` to every left and every right bound strictly greater than
    /// `threshold` in `scope`. The two bounds are shifted independently.
    pub fn shift_bounds_above<S: NodeStore + ?Sized>(
        &self,
        store: &mut S,
        threshold: i64,
        delta: i64,
        scope: Scope,
    ) -> Result<u64, TreeError> {
        if delta == 0 {
            return Ok(0);
        }

        let fields = &self.config.fields;
        let mut rows = 0;
        for field in [&fields.left, &fields.right] {
            let pred = self.scope_predicate(scope) & Predicate::gt(field, threshold);
            rows += store.bulk_update(&pred, &[Assignment::add(field, delta)])?;
        }

        trace!(threshold, delta, ?scope, rows, "shifted bounds");
        sink::record(MetricsEvent::BoundsShifted { rows });

        Ok(rows)
    }

    /// Shift the subtree occupying `[range_left, range_right]` in `source` by
    /// `delta`, moving it into `dest` and adjusting levels by `level_delta`.
    #[allow(clippy::too_many_arguments)]
    pub fn shift_range<S: NodeStore + ?Sized>(
        &self,
        store: &mut S,
        range_left: i64,
        range_right: i64,
        delta: i64,
        source: Scope,
        dest: Scope,
        level_delta: i64,
    ) -> Result<u64, TreeError> {
        let fields = &self.config.fields;
        let pred = self.scope_predicate(source)
            & Predicate::gte(&fields.left, range_left)
            & Predicate::lte(&fields.right, range_right);

        let mut assignments = Vec::with_capacity(4);
        if delta != 0 {
            assignments.push(Assignment::add(&fields.left, delta));
            assignments.push(Assignment::add(&fields.right, delta));
        }
        if let Some(level) = &fields.level
            && level_delta != 0
        {
            assignments.push(Assignment::add(level, level_delta));
        }
        if let (Some(root), Scope::Tree(dest_root)) = (&fields.root, dest)
            && source != dest
        {
            assignments.push(Assignment::set(root, dest_root));
        }
        if assignments.is_empty() {
            return Ok(0);
        }

        let rows = store.bulk_update(&pred, &assignments)?;
        trace!(
            range_left,
            range_right,
            delta,
            level_delta,
            ?source,
            ?dest,
            rows,
            "shifted range"
        );
        sink::record(MetricsEvent::BoundsShifted { rows });

        Ok(rows)
    }

    /// Resolve bounds for a new node and open a two-slot gap for it.
    pub fn allocate_position<S: NodeStore + ?Sized>(
        &self,
        store: &mut S,
        anchor: Option<NodeId>,
        position: Position,
    ) -> Result<Allocation, TreeError> {
        let Some(anchor) = anchor else {
            return self.allocate_top_level(store);
        };
        let anchor = self.load(store, anchor)?;
        let anchor_id = anchor.id.ok_or_else(TreeError::unmanaged)?;
        self.reject_forest_root_sibling(&anchor, position)?;

        let (parent, start, level) = self.slot(&anchor, anchor_id, position);

        self.shift_bounds_above(store, start - 1, 2, self.scope_of(&anchor))?;

        Ok(Allocation {
            parent,
            left: start,
            right: start + 1,
            level,
            root: anchor.root,
            new_tree: false,
        })
    }

    fn allocate_top_level<S: NodeStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Allocation, TreeError> {
        let start = if self.config.is_forest() {
            1
        } else {
            self.max_bound(store, Scope::Store)? + 1
        };

        Ok(Allocation {
            parent: None,
            left: start,
            right: start + 1,
            level: self.config.root_level(),
            root: None,
            new_tree: self.config.is_forest(),
        })
    }

    /// Move the subtree rooted at `id` to `position` relative to `anchor`.
    /// `None` detaches it to the top level; in a forest that starts a new
    /// tree rooted at the node. Returns `false` when nothing had to move.
    pub fn relocate<S: NodeStore + ?Sized>(
        &self,
        store: &mut S,
        id: NodeId,
        anchor: Option<NodeId>,
        position: Position,
    ) -> Result<bool, TreeError> {
        match self.plan_relocation(store, id, anchor, position)? {
            Some(plan) => {
                self.apply_relocation(store, &plan)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Validate a move without writing anything. `None` means the node is
    /// already where it would land.
    pub fn plan_relocation<S: NodeStore + ?Sized>(
        &self,
        store: &S,
        id: NodeId,
        anchor: Option<NodeId>,
        position: Position,
    ) -> Result<Option<Relocation>, TreeError> {
        let node = self.load(store, id)?;
        let target = self.resolve_target(store, &node, anchor, position)?;

        Ok(target.map(|target| Relocation { node, target }))
    }

    /// Open a gap at the target, move the subtree into it, close the gap it
    /// left behind, and rewrite the parent reference.
    pub fn apply_relocation<S: NodeStore + ?Sized>(
        &self,
        store: &mut S,
        plan: &Relocation,
    ) -> Result<(), TreeError> {
        let Relocation { node, target } = plan;
        let id = node.id.ok_or_else(TreeError::unmanaged)?;
        let old_scope = self.scope_of(node);
        let size = node.span();

        if !target.new_tree {
            self.shift_bounds_above(store, target.start - 1, size, target.scope)?;
        }

        // the gap opened in front of the subtree pushed it along
        let (mut left, mut right) = (node.left, node.right);
        if target.scope == old_scope && left >= target.start {
            left += size;
            right += size;
        }

        let level_delta = match (target.level, node.level) {
            (Some(to), Some(from)) => to - from,
            (Some(to), None) => to - self.config.base_level,
            _ => 0,
        };
        self.shift_range(
            store,
            left,
            right,
            target.start - left,
            old_scope,
            target.scope,
            level_delta,
        )?;
        self.shift_bounds_above(store, right, -size, old_scope)?;

        store.bulk_update(
            &Predicate::IdEq(id),
            &[Assignment::set(&self.config.fields.parent, target.parent)],
        )?;

        trace!(%id, start = target.start, new_tree = target.new_tree, "relocated subtree");

        Ok(())
    }

    fn resolve_target<S: NodeStore + ?Sized>(
        &self,
        store: &S,
        node: &Node,
        anchor: Option<NodeId>,
        position: Position,
    ) -> Result<Option<Target>, TreeError> {
        let id = node.id.ok_or_else(TreeError::unmanaged)?;

        let Some(anchor_id) = anchor else {
            if self.config.is_forest() {
                if node.parent.is_none() {
                    return Ok(None);
                }
                return Ok(Some(Target {
                    parent: None,
                    start: 1,
                    level: self.config.root_level(),
                    scope: Scope::Tree(Some(id)),
                    new_tree: true,
                }));
            }

            let max = self.max_bound(store, Scope::Store)?;
            if node.parent.is_none() && node.right == max {
                return Ok(None);
            }
            return Ok(Some(Target {
                parent: None,
                start: max + 1,
                level: self.config.root_level(),
                scope: Scope::Store,
                new_tree: false,
            }));
        };

        if anchor_id == id {
            return Err(TreeError::invalid_placement(format!(
                "node [{id}] cannot be placed relative to itself"
            )));
        }

        let anchor = self.load(store, anchor_id)?;
        let scope = self.scope_of(&anchor);
        if scope == self.scope_of(node) && node.encloses(&anchor) {
            return Err(TreeError::invalid_placement(format!(
                "node [{id}] cannot be moved into its own subtree"
            )));
        }
        self.reject_forest_root_sibling(&anchor, position)?;

        let (parent, start, level) = self.slot(&anchor, anchor_id, position);

        Ok(Some(Target {
            parent,
            start,
            level,
            scope,
            new_tree: false,
        }))
    }

    pub(crate) fn reject_forest_root_sibling(
        &self,
        anchor: &Node,
        position: Position,
    ) -> Result<(), TreeError> {
        if self.config.is_forest() && position.is_sibling() && anchor.parent.is_none() {
            let id = anchor.id.map_or_else(String::new, |id| id.to_string());
            return Err(TreeError::invalid_placement(format!(
                "cannot place a sibling of tree root [{id}] in a forest"
            )));
        }

        Ok(())
    }

    /// Parent, first bound, and level a node takes at `position` of `anchor`.
    fn slot(
        &self,
        anchor: &Node,
        anchor_id: NodeId,
        position: Position,
    ) -> (Option<NodeId>, i64, Option<i64>) {
        match position {
            Position::FirstChild => (Some(anchor_id), anchor.left + 1, self.child_level(anchor)),
            Position::LastChild => (Some(anchor_id), anchor.right, self.child_level(anchor)),
            Position::NextSibling => (anchor.parent, anchor.right + 1, anchor.level),
            Position::PrevSibling => (anchor.parent, anchor.left, anchor.level),
        }
    }

    fn child_level(&self, parent: &Node) -> Option<i64> {
        self.config
            .root_level()
            .map(|base| parent.level.unwrap_or(base) + 1)
    }
}
