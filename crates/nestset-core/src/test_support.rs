//! Fixtures shared by unit tests: tree builders, raw row seeding, and a
//! store wrapper that fails on demand.

use crate::{
    config::TreeConfig,
    index::Position,
    node::{Fields, Node, NodeId, Row},
    obs::{MetricsEvent, MetricsSink},
    store::{Assignment, MemoryStore, NodeStore, OrderBy, Predicate, StoreError},
    tree::NestedTree,
    verify::VerifyOptions,
};
use std::cell::{Ref, RefCell};

pub(crate) const TITLE: &str = "title";

/// Empty repository over a `MemoryStore` carrying the role fields and a
/// `title` attribute.
pub(crate) fn tree(config: TreeConfig) -> NestedTree<MemoryStore> {
    let store = MemoryStore::for_config(&config, &[TITLE]);
    NestedTree::new(store, config).expect("fixture config should bind to its store")
}

pub(crate) fn titled(title: &str) -> Node {
    Node::new().with_attr(TITLE, title)
}

pub(crate) fn insert<S: NodeStore>(
    tree: &mut NestedTree<S>,
    title: &str,
    anchor: Option<NodeId>,
    position: Position,
) -> NodeId {
    tree.insert(&mut titled(title), anchor, position)
        .unwrap_or_else(|err| panic!("insert of '{title}' should succeed: {err}"))
}

///
/// Food
///
/// `Food(1,10) → Fruits(2,3), Vegetables(4,9) → Carrots(5,6), Potatoes(7,8)`
///

pub(crate) struct Food<S: NodeStore> {
    pub(crate) tree: NestedTree<S>,
    pub(crate) food: NodeId,
    pub(crate) fruits: NodeId,
    pub(crate) vegetables: NodeId,
    pub(crate) carrots: NodeId,
    pub(crate) potatoes: NodeId,
}

pub(crate) fn food_tree(config: TreeConfig) -> Food<MemoryStore> {
    let mut tree = tree(config);

    let food = insert(&mut tree, "Food", None, Position::LastChild);
    let fruits = insert(&mut tree, "Fruits", Some(food), Position::LastChild);
    let vegetables = insert(&mut tree, "Vegetables", Some(food), Position::LastChild);
    let carrots = insert(&mut tree, "Carrots", Some(vegetables), Position::LastChild);
    let potatoes = insert(&mut tree, "Potatoes", Some(vegetables), Position::LastChild);

    Food {
        tree,
        food,
        fruits,
        vegetables,
        carrots,
        potatoes,
    }
}

pub(crate) fn bounds<S: NodeStore>(tree: &NestedTree<S>, id: NodeId) -> (i64, i64) {
    let node = tree.node(id).expect("node should exist");
    (node.left, node.right)
}

pub(crate) fn titles(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| node.attr(TITLE).map(ToString::to_string).unwrap_or_default())
        .collect()
}

pub(crate) fn assert_valid<S: NodeStore>(tree: &NestedTree<S>) {
    let verification = tree
        .verify(&VerifyOptions::default())
        .expect("verify should not fail");
    assert!(
        verification.is_valid(),
        "tree should verify, got {:?}",
        verification.messages()
    );
}

/// Every row in id order, for before/after comparisons.
pub(crate) fn rows<S: NodeStore + ?Sized>(store: &S) -> Vec<Row> {
    store
        .fetch(&Predicate::True, &[])
        .expect("fetch should succeed")
}

/// Node with explicit role values, for seeding broken or hand-built trees.
pub(crate) fn raw(parent: Option<u64>, left: i64, right: i64, level: Option<i64>) -> Node {
    Node {
        parent: parent.map(NodeId::new),
        left,
        right,
        level,
        ..Node::default()
    }
}

/// Write `node` under an explicit id, bypassing bound maintenance.
pub(crate) fn put(store: &mut MemoryStore, config: &TreeConfig, id: u64, title: &str, node: Node) {
    let fields = node.with_attr(TITLE, title).to_fields(&config.fields);
    store.put(NodeId::new(id), fields);
}

///
/// FaultyStore
///
/// `MemoryStore` wrapper that fails bulk updates once a budget of successful
/// updates is spent, and optionally fails every delete.
///

pub(crate) struct FaultyStore {
    pub(crate) inner: MemoryStore,
    update_budget: Option<u64>,
    fail_deletes: bool,
}

impl FaultyStore {
    pub(crate) const fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            update_budget: None,
            fail_deletes: false,
        }
    }

    pub(crate) const fn fail_updates_after(mut self, successes: u64) -> Self {
        self.update_budget = Some(successes);
        self
    }

    pub(crate) const fn fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }
}

impl NodeStore for FaultyStore {
    fn fetch(&self, predicate: &Predicate, order: &[OrderBy]) -> Result<Vec<Row>, StoreError> {
        self.inner.fetch(predicate, order)
    }

    fn bulk_update(
        &mut self,
        predicate: &Predicate,
        assignments: &[Assignment],
    ) -> Result<u64, StoreError> {
        match self.update_budget {
            Some(0) => return Err(StoreError::Backend("injected update failure".to_string())),
            Some(n) => self.update_budget = Some(n - 1),
            None => {}
        }
        self.inner.bulk_update(predicate, assignments)
    }

    fn insert(&mut self, fields: Fields) -> Result<NodeId, StoreError> {
        self.inner.insert(fields)
    }

    fn delete(&mut self, predicate: &Predicate) -> Result<u64, StoreError> {
        if self.fail_deletes {
            return Err(StoreError::Backend("injected delete failure".to_string()));
        }
        self.inner.delete(predicate)
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        self.inner.begin_transaction()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback()
    }

    fn evict(&mut self, id: NodeId) {
        self.inner.evict(id);
    }

    fn has_field(&self, field: &str) -> bool {
        self.inner.has_field(field)
    }
}

///
/// Capture
///
/// Metrics sink that keeps every event for later assertions.
///

#[derive(Default)]
pub(crate) struct Capture(RefCell<Vec<MetricsEvent>>);

impl Capture {
    pub(crate) fn events(&self) -> Ref<'_, Vec<MetricsEvent>> {
        self.0.borrow()
    }
}

impl MetricsSink for Capture {
    fn record(&self, event: MetricsEvent) {
        self.0.borrow_mut().push(event);
    }
}
