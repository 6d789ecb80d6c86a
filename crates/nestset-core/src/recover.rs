//! Bound recomputation from parent links.
//!
//! Both passes walk each tree depth-first, assigning `left` on entry and
//! `right` on exit. `recover` hydrates every row up front and writes only the
//! rows whose bounds changed; `recover_fast` queries children per node and
//! writes each node as soon as its subtree is numbered.

#[cfg(test)]
mod tests;

use crate::{
    commit::{TxPhase, run_in_transaction},
    config::TreeConfig,
    error::TreeError,
    node::{Node, NodeId},
    obs::sink::{self, MetricsEvent, OpKind, Span},
    store::{Assignment, NodeStore, OrderBy, Predicate},
    tree::NestedTree,
    verify::{VerifyOptions, verify},
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

///
/// RecoverOptions
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecoverOptions {
    /// Forest only: recover this root's tree and leave the others alone.
    pub tree_root: Option<NodeId>,

    /// Recompute even when the stored bounds already verify. Also skips the
    /// audit pass, which reads every row once before any numbering starts.
    pub skip_verify: bool,

    /// Sibling order while numbering; stored `left` order when unset.
    pub sort: Option<OrderBy>,
}

///
/// RecoveryReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub trees: u64,
    pub nodes_visited: u64,
    pub rows_updated: u64,

    /// Rows no root reaches through parent links (orphans and cycles).
    pub unreachable: Vec<NodeId>,
}

/// Bounds assigned to one node by a walk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Numbering {
    left: i64,
    right: i64,
    level: i64,
    root: NodeId,
}

///
/// Recovery
///
/// Shared settings of one recovery pass.
///

struct Recovery<'a> {
    config: &'a TreeConfig,
    order: Vec<OrderBy>,
}

impl<'a> Recovery<'a> {
    fn new<S: NodeStore + ?Sized>(
        store: &S,
        config: &'a TreeConfig,
        options: &RecoverOptions,
    ) -> Result<Self, TreeError> {
        let order = match &options.sort {
            Some(key) if !store.has_field(&key.field) => {
                return Err(TreeError::invalid_argument(format!(
                    "Invalid sort options specified: field - {}, direction - {}",
                    key.field, key.direction
                )));
            }
            Some(key) => vec![key.clone()],
            None => vec![OrderBy::asc(&config.fields.left)],
        };

        Ok(Self { config, order })
    }

    /// True when the pass should be skipped because the store verifies.
    fn already_valid<S: NodeStore + ?Sized>(
        &self,
        store: &S,
        options: &RecoverOptions,
    ) -> Result<bool, TreeError> {
        if options.skip_verify {
            return Ok(false);
        }
        let verification = verify(
            store,
            self.config,
            &VerifyOptions {
                tree_root: options.tree_root,
            },
        )?;

        Ok(verification.is_valid())
    }

    /// Roots to walk, honoring the forest tree selector.
    fn roots(&self, roots: Vec<NodeId>, options: &RecoverOptions) -> Vec<NodeId> {
        match options.tree_root {
            Some(selected) if self.config.is_forest() => {
                roots.into_iter().filter(|id| *id == selected).collect()
            }
            _ => roots,
        }
    }

    fn assignments(&self, numbering: Numbering) -> Vec<Assignment> {
        let fields = &self.config.fields;
        let mut out = vec![
            Assignment::set(&fields.left, numbering.left),
            Assignment::set(&fields.right, numbering.right),
        ];
        if let Some(level) = &fields.level {
            out.push(Assignment::set(level, numbering.level));
        }
        if let Some(root) = &fields.root {
            out.push(Assignment::set(root, numbering.root));
        }

        out
    }

    fn is_current(&self, node: &Node, numbering: Numbering) -> bool {
        node.left == numbering.left
            && node.right == numbering.right
            && (!self.config.tracks_level() || node.level == Some(numbering.level))
            && (!self.config.is_forest() || node.root == Some(numbering.root))
    }
}

///
/// Hydrated
///
/// Whole store loaded into memory, children grouped under their parent in
/// sibling order.
///

struct Hydrated {
    nodes: BTreeMap<NodeId, Node>,
    children: BTreeMap<Option<NodeId>, Vec<NodeId>>,
}

impl Hydrated {
    /// Number the tree under `root` starting at `counter`; returns the next
    /// free bound. Nodes already in `visited` are skipped.
    fn walk(
        &self,
        root: NodeId,
        level: i64,
        counter: i64,
        visited: &mut BTreeSet<NodeId>,
        out: &mut Vec<(NodeId, Numbering)>,
    ) -> i64 {
        if !visited.insert(root) {
            return counter;
        }

        let mut stack = vec![Frame::new(root, level, counter, self.children_of(root))];
        let mut next = counter + 1;
        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.pending.pop() {
                let level = frame.level + 1;
                if visited.insert(child) {
                    stack.push(Frame::new(child, level, next, self.children_of(child)));
                    next += 1;
                }
                continue;
            }

            out.push((frame.id, frame.close(next, root)));
            stack.pop();
            next += 1;
        }

        next
    }

    fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        self.children.get(&Some(id)).cloned().unwrap_or_default()
    }
}

///
/// Frame
///
/// One open node of a depth-first walk. `pending` holds the children still
/// to visit, last sibling first.
///

struct Frame {
    id: NodeId,
    level: i64,
    left: i64,
    pending: Vec<NodeId>,
}

impl Frame {
    fn new(id: NodeId, level: i64, left: i64, mut children: Vec<NodeId>) -> Self {
        children.reverse();

        Self {
            id,
            level,
            left,
            pending: children,
        }
    }

    const fn close(&self, right: i64, root: NodeId) -> Numbering {
        Numbering {
            left: self.left,
            right,
            level: self.level,
            root,
        }
    }
}

/// Recompute bounds from parent links, hydrating the whole store first.
///
/// Returns `None` when verification passes and `skip_verify` is unset.
pub fn recover<S: NodeStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    options: &RecoverOptions,
) -> Result<Option<RecoveryReport>, TreeError> {
    let pass = Recovery::new(store, config, options)?;
    if pass.already_valid(store, options)? {
        return Ok(None);
    }

    let mut hydrated = Hydrated {
        nodes: BTreeMap::new(),
        children: BTreeMap::new(),
    };
    for row in store.fetch(&Predicate::True, &pass.order)? {
        let node = Node::from_row(&row, &config.fields);
        hydrated.children.entry(node.parent).or_default().push(row.id);
        hydrated.nodes.insert(row.id, node);
    }

    let roots = hydrated.children.get(&None).cloned().unwrap_or_default();
    let roots = pass.roots(roots, options);

    let mut report = RecoveryReport::default();
    let mut visited = BTreeSet::new();
    let mut numbered = Vec::with_capacity(hydrated.nodes.len());
    let mut counter = 1;
    for root in &roots {
        if config.is_forest() {
            counter = 1;
        }
        counter = hydrated.walk(
            *root,
            config.base_level,
            counter,
            &mut visited,
            &mut numbered,
        );
        report.trees += 1;
    }

    report.nodes_visited = visited.len() as u64;
    if options.tree_root.is_none() || !config.is_forest() {
        report.unreachable = hydrated
            .nodes
            .keys()
            .filter(|id| !visited.contains(id))
            .copied()
            .collect();
    }

    let stale = numbered
        .into_iter()
        .filter(|(id, numbering)| {
            hydrated
                .nodes
                .get(id)
                .is_none_or(|node| !pass.is_current(node, *numbering))
        })
        .collect::<Vec<_>>();

    report.rows_updated = run_in_transaction(store, "recover", |tx| {
        tx.enter(TxPhase::Shifting)?;
        let mut updated = 0;
        for (id, numbering) in &stale {
            updated += tx
                .store()
                .bulk_update(&Predicate::IdEq(*id), &pass.assignments(*numbering))?;
        }

        Ok(updated)
    })?;

    debug!(
        trees = report.trees,
        visited = report.nodes_visited,
        updated = report.rows_updated,
        unreachable = report.unreachable.len(),
        "tree recovered"
    );

    Ok(Some(report))
}

/// Recompute bounds without hydrating the tree: one child query and one
/// update per node. Every touched id is evicted from the store's cache.
pub fn recover_fast<S: NodeStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    options: &RecoverOptions,
) -> Result<Option<RecoveryReport>, TreeError> {
    let pass = Recovery::new(store, config, options)?;
    if pass.already_valid(store, options)? {
        return Ok(None);
    }

    let (report, touched) = run_in_transaction(store, "recover_fast", |tx| {
        tx.enter(TxPhase::Shifting)?;

        let roots = tx
            .store()
            .fetch(&Predicate::is_null(&config.fields.parent), &pass.order)?
            .into_iter()
            .map(|row| row.id)
            .collect();
        let roots = pass.roots(roots, options);

        let mut report = RecoveryReport::default();
        let mut visited = BTreeSet::new();
        let mut counter = 1;
        for root in &roots {
            if config.is_forest() {
                counter = 1;
            }
            counter = walk_fast(
                tx.store(),
                &pass,
                *root,
                config.base_level,
                counter,
                &mut visited,
                &mut report,
            )?;
            report.trees += 1;
        }
        report.nodes_visited = visited.len() as u64;

        if options.tree_root.is_none() || !config.is_forest() {
            report.unreachable = tx
                .store()
                .fetch(&Predicate::True, &[])?
                .into_iter()
                .map(|row| row.id)
                .filter(|id| !visited.contains(id))
                .collect();
        }

        Ok((report, visited))
    })?;

    for id in touched {
        store.evict(id);
    }
    debug!(
        trees = report.trees,
        visited = report.nodes_visited,
        "tree recovered without hydration"
    );

    Ok(Some(report))
}

fn walk_fast<S: NodeStore + ?Sized>(
    store: &mut S,
    pass: &Recovery<'_>,
    root: NodeId,
    level: i64,
    counter: i64,
    visited: &mut BTreeSet<NodeId>,
    report: &mut RecoveryReport,
) -> Result<i64, TreeError> {
    if !visited.insert(root) {
        return Ok(counter);
    }

    let mut stack = vec![Frame::new(root, level, counter, children_fast(store, pass, root)?)];
    let mut next = counter + 1;
    while let Some(frame) = stack.last_mut() {
        if let Some(child) = frame.pending.pop() {
            let level = frame.level + 1;
            if visited.insert(child) {
                let children = children_fast(store, pass, child)?;
                stack.push(Frame::new(child, level, next, children));
                next += 1;
            }
            continue;
        }

        let (id, numbering) = (frame.id, frame.close(next, root));
        stack.pop();
        report.rows_updated +=
            store.bulk_update(&Predicate::IdEq(id), &pass.assignments(numbering))?;
        next += 1;
    }

    Ok(next)
}

fn children_fast<S: NodeStore + ?Sized>(
    store: &S,
    pass: &Recovery<'_>,
    id: NodeId,
) -> Result<Vec<NodeId>, TreeError> {
    let rows = store.fetch(&Predicate::eq(&pass.config.fields.parent, id), &pass.order)?;

    Ok(rows.into_iter().map(|row| row.id).collect())
}

impl<S: NodeStore> NestedTree<S> {
    /// Recompute bounds from parent links; see [`recover`].
    pub fn recover(
        &mut self,
        options: &RecoverOptions,
    ) -> Result<Option<RecoveryReport>, TreeError> {
        let span = Span::new(OpKind::Recover);
        let (store, config) = self.parts_mut();
        let report = recover(store, config, options)?;
        finish_recovery(span, report.as_ref());

        Ok(report)
    }

    /// Recompute bounds without hydrating the tree; see [`recover_fast`].
    ///
    /// `Node` values loaded before this call are stale afterwards.
    pub fn recover_fast(
        &mut self,
        options: &RecoverOptions,
    ) -> Result<Option<RecoveryReport>, TreeError> {
        let span = Span::new(OpKind::Recover);
        let (store, config) = self.parts_mut();
        let report = recover_fast(store, config, options)?;
        finish_recovery(span, report.as_ref());

        Ok(report)
    }
}

fn finish_recovery(mut span: Span, report: Option<&RecoveryReport>) {
    if let Some(report) = report {
        sink::record(MetricsEvent::NodesRecovered {
            count: report.nodes_visited,
        });
        span.add_rows(report.rows_updated);
    }
    span.finish();
}
