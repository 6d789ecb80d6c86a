use crate::{
    PENDING_LEFT,
    commit::{TxPhase, run_in_transaction},
    error::TreeError,
    index::{IndexStrategy, Position, Scope},
    node::{Node, NodeId},
    obs::sink::{self, MetricsEvent, OpKind, Span},
    store::{Assignment, NodeStore, OrderBy, Predicate},
    tree::{
        Anchor, ChildrenOptions, MoveDirection, NestedTree, PendingPlacement, PlacementTicket,
        ReorderOptions, Steps, require_id,
    },
    value::Value,
    verify::VerifyOptions,
};
use tracing::debug;

impl<S: NodeStore> NestedTree<S> {
    /// Queue `node` for insertion at `position` relative to `anchor`.
    ///
    /// The parent reference is written immediately and the node carries the
    /// pending sentinel until `flush` resolves its bounds.
    pub fn place(
        &mut self,
        node: &mut Node,
        anchor: Option<Anchor>,
        position: Position,
    ) -> Result<PlacementTicket, TreeError> {
        if let Some(id) = node.id {
            return Err(TreeError::invalid_argument(format!(
                "node [{id}] is already stored; use move_to to relocate it"
            )));
        }

        let parent = match anchor {
            None => None,
            Some(Anchor::Node(anchor_id)) => {
                let anchor = self.node(anchor_id)?;
                self.index()
                    .reject_forest_root_sibling(&anchor, position)?;
                if position.is_sibling() {
                    anchor.parent
                } else {
                    Some(anchor_id)
                }
            }
            Some(Anchor::Pending(ticket)) => {
                let queued = self
                    .pending
                    .iter()
                    .find(|p| p.ticket == ticket)
                    .ok_or_else(|| {
                        TreeError::invalid_placement(format!(
                            "placement [{ticket}] is not queued"
                        ))
                    })?;
                if self.config.is_forest() && position.is_sibling() && queued.anchor.is_none() {
                    return Err(TreeError::invalid_placement(format!(
                        "cannot place a sibling of queued tree root [{ticket}] in a forest"
                    )));
                }
                if position.is_sibling() {
                    queued.node.parent
                } else {
                    None
                }
            }
        };

        node.parent = parent;
        node.left = PENDING_LEFT;
        node.right = PENDING_LEFT;
        node.level = None;
        node.root = None;

        self.next_ticket += 1;
        let ticket = PlacementTicket::from(self.next_ticket);
        self.pending.push(PendingPlacement {
            ticket,
            node: node.clone(),
            anchor,
            position,
        });
        debug!(%ticket, ?anchor, %position, "placement queued");

        Ok(ticket)
    }

    /// Resolve every queued placement in order and insert the rows.
    ///
    /// Runs in one transaction. On failure nothing is written and the queue
    /// is kept intact.
    pub fn flush(&mut self) -> Result<Vec<(PlacementTicket, NodeId)>, TreeError> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut span = Span::new(OpKind::Place);
        let index = IndexStrategy::new(&self.config);
        let fields = &self.config.fields;
        let pending = &self.pending;

        let placed = run_in_transaction(&mut self.store, "flush", |tx| {
            tx.enter(TxPhase::Shifting)?;

            let mut placed: Vec<(PlacementTicket, NodeId)> = Vec::with_capacity(pending.len());
            for p in pending {
                let anchor = match p.anchor {
                    None => None,
                    Some(Anchor::Node(id)) => Some(id),
                    Some(Anchor::Pending(ticket)) => Some(
                        placed
                            .iter()
                            .find_map(|(t, id)| (*t == ticket).then_some(*id))
                            .ok_or_else(|| {
                                TreeError::invalid_placement(format!(
                                    "placement [{}] anchors on unflushed [{ticket}]",
                                    p.ticket
                                ))
                            })?,
                    ),
                };

                let allocation = index.allocate_position(tx.store(), anchor, p.position)?;
                let mut node = p.node.clone();
                allocation.apply(&mut node);

                let id = tx.store().insert(node.to_fields(fields))?;
                if allocation.new_tree
                    && let Some(root) = &fields.root
                {
                    tx.store()
                        .bulk_update(&Predicate::IdEq(id), &[Assignment::set(root, id)])?;
                }
                debug!(ticket = %p.ticket, %id, left = allocation.left, "placement resolved");
                placed.push((p.ticket, id));
            }

            Ok(placed)
        })?;

        self.pending.clear();
        let rows = placed.len() as u64;
        sink::record(MetricsEvent::RowsInserted { rows });
        span.add_rows(rows);
        span.finish();

        Ok(placed)
    }

    /// Place and flush one node; `node` is refreshed from the store.
    ///
    /// Any other queued placements are flushed with it.
    pub fn insert(
        &mut self,
        node: &mut Node,
        anchor: Option<NodeId>,
        position: Position,
    ) -> Result<NodeId, TreeError> {
        let ticket = self.place(node, anchor.map(Anchor::Node), position)?;

        let placed = match self.flush() {
            Ok(placed) => placed,
            Err(err) => {
                self.pending.retain(|p| p.ticket != ticket);
                return Err(err);
            }
        };
        let id = placed
            .into_iter()
            .find_map(|(t, id)| (t == ticket).then_some(id))
            .ok_or_else(|| {
                TreeError::invalid_operation(format!("placement [{ticket}] was not flushed"))
            })?;
        *node = self.node(id)?;

        Ok(id)
    }

    /// Shift a node among its siblings. Returns `false` when there is no
    /// sibling in that direction.
    pub fn move_by(
        &mut self,
        id: NodeId,
        direction: MoveDirection,
        steps: Steps,
    ) -> Result<bool, TreeError> {
        let (siblings, position) = match direction {
            MoveDirection::Down => (self.next_siblings(id, false)?, Position::NextSibling),
            MoveDirection::Up => {
                let mut prev = self.prev_siblings(id, false)?;
                prev.reverse();
                (prev, Position::PrevSibling)
            }
        };

        let available = siblings.len();
        let reach = match steps {
            Steps::ToEnd => available,
            Steps::By(n) => usize::try_from(n).map_or(available, |n| n.min(available)),
        };
        let Some(target) = reach.checked_sub(1).and_then(|i| siblings.get(i)) else {
            return Ok(false);
        };
        let target = require_id(target)?;

        let span = Span::new(OpKind::Move);
        let moved = IndexStrategy::new(&self.config).relocate(
            &mut self.store,
            id,
            Some(target),
            position,
        )?;
        debug!(%id, ?direction, %target, "moved among siblings");
        span.finish();

        Ok(moved)
    }

    pub fn move_down(&mut self, id: NodeId, steps: Steps) -> Result<bool, TreeError> {
        self.move_by(id, MoveDirection::Down, steps)
    }

    pub fn move_up(&mut self, id: NodeId, steps: Steps) -> Result<bool, TreeError> {
        self.move_by(id, MoveDirection::Up, steps)
    }

    /// Move a stored subtree to `position` relative to `anchor`, possibly
    /// into another tree. `None` detaches it to the top level.
    pub fn move_to(
        &mut self,
        id: NodeId,
        anchor: Option<NodeId>,
        position: Position,
    ) -> Result<bool, TreeError> {
        let index = IndexStrategy::new(&self.config);
        let Some(plan) = index.plan_relocation(&self.store, id, anchor, position)? else {
            return Ok(false);
        };

        let mut span = Span::new(OpKind::Move);
        run_in_transaction(&mut self.store, "move", |tx| {
            tx.enter(TxPhase::Shifting)?;
            index.apply_relocation(tx.store(), &plan)
        })?;
        debug!(%id, ?anchor, %position, new_tree = plan.starts_new_tree(), "subtree moved");
        span.add_rows(plan.node().span().unsigned_abs() / 2);
        span.finish();

        Ok(true)
    }

    /// Re-attach a node as the first child of `parent`; `None` promotes it to
    /// the top level (a new tree in a forest).
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<bool, TreeError> {
        self.move_to(id, parent, Position::FirstChild)
    }

    /// Delete one node, keeping its descendants in the tree.
    ///
    /// Direct children move up to the removed node's parent. When a forest
    /// root is removed, each direct child becomes the root of its own tree.
    pub fn remove_and_reparent(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id)?;
        let mut span = Span::new(OpKind::Remove);

        let index = IndexStrategy::new(&self.config);
        let config = &self.config;
        let fields = &config.fields;
        let scope = index.scope_of(&node);

        let touched = run_in_transaction(&mut self.store, "remove", |tx| {
            let mut touched = 0;

            if node.is_leaf() {
                tx.enter(TxPhase::Shifting)?;
                touched += tx.store().delete(&Predicate::IdEq(id))?;
                index.shift_bounds_above(tx.store(), node.right, -2, scope)?;

                return Ok(touched);
            }

            tx.enter(TxPhase::Reparenting)?;
            let direct = index.scope_predicate(scope) & Predicate::eq(&fields.parent, id);

            if config.is_forest() && node.parent.is_none() {
                let children = tx
                    .store()
                    .fetch(&direct, &[OrderBy::asc(&fields.left)])?;
                for row in &children {
                    let child = Node::from_row(row, fields);
                    touched += index.shift_range(
                        tx.store(),
                        child.left,
                        child.right,
                        -(child.left - 1),
                        scope,
                        Scope::Tree(Some(row.id)),
                        -1,
                    )?;
                    tx.store().bulk_update(
                        &Predicate::IdEq(row.id),
                        &[Assignment::set(&fields.parent, Value::Null)],
                    )?;
                }
            } else {
                touched += tx
                    .store()
                    .bulk_update(&direct, &[Assignment::set(&fields.parent, node.parent)])?;
                tx.enter(TxPhase::Shifting)?;
                touched += index.shift_range(
                    tx.store(),
                    node.left,
                    node.right,
                    -1,
                    scope,
                    scope,
                    -1,
                )?;
                index.shift_bounds_above(tx.store(), node.right, -2, scope)?;
            }

            touched += tx.store().delete(&Predicate::IdEq(id))?;

            Ok(touched)
        })?;

        self.store.evict(id);
        sink::record(MetricsEvent::RowsDeleted { rows: 1 });
        debug!(%id, touched, "node removed");
        span.add_rows(touched);
        span.finish();

        Ok(())
    }

    /// Reorder the direct children of `node` (the top level when `None`) by
    /// `sort`, recursing into non-leaf children unless disabled.
    ///
    /// Returns `false` without touching anything when verification is
    /// requested and the tree is inconsistent. Forest roots keep their
    /// order; only their subtrees are reordered.
    pub fn reorder(
        &mut self,
        node: Option<NodeId>,
        sort: &[OrderBy],
        options: ReorderOptions,
    ) -> Result<bool, TreeError> {
        if options.verify && !self.verify(&VerifyOptions::default())?.is_valid() {
            debug!(?node, "reorder skipped: tree failed verification");
            return Ok(false);
        }
        self.validate_sort(sort)?;

        let span = Span::new(OpKind::Reorder);
        self.reorder_children(node, sort, options.recursive)?;
        span.finish();

        Ok(true)
    }

    /// Reorder every tree in the store.
    pub fn reorder_all(&mut self, sort: &[OrderBy], verify: bool) -> Result<bool, TreeError> {
        self.reorder(
            None,
            sort,
            ReorderOptions {
                verify,
                recursive: true,
            },
        )
    }

    fn reorder_children(
        &mut self,
        node: Option<NodeId>,
        sort: &[OrderBy],
        recursive: bool,
    ) -> Result<(), TreeError> {
        let options = ChildrenOptions {
            direct: true,
            sort: sort.to_vec(),
            include_node: false,
        };
        let children = self.children(node, &options)?;
        let movable = node.is_some() || !self.config.is_forest();

        for child in children {
            let id = require_id(&child)?;
            if movable {
                self.move_by(id, MoveDirection::Down, Steps::ToEnd)?;
            }
            if recursive && !child.is_leaf() {
                self.reorder_children(Some(id), sort, recursive)?;
            }
        }

        Ok(())
    }
}
