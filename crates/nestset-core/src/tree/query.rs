use crate::{
    error::TreeError,
    node::{Node, NodeId},
    store::{CompareOp, NodeStore, OrderBy, Predicate},
    tree::{ChildrenOptions, NestedTree, PathOptions},
};

impl<S: NodeStore> NestedTree<S> {
    /// Nodes without a parent, ordered by `left` unless `sort` is given.
    pub fn root_nodes(&self, sort: Option<OrderBy>) -> Result<Vec<Node>, TreeError> {
        let order = self.order_or_left(sort.as_slice())?;
        let pred = Predicate::is_null(&self.config.fields.parent);

        Ok(self.decode(self.store.fetch(&pred, &order)?))
    }

    /// Ancestors of `id` from the root down, optionally ending with the node.
    pub fn path(&self, id: NodeId, include_node: bool) -> Result<Vec<Node>, TreeError> {
        let node = self.node(id)?;
        let fields = &self.config.fields;

        let bounds = if include_node {
            Predicate::lte(&fields.left, node.left) & Predicate::gte(&fields.right, node.right)
        } else {
            Predicate::lt(&fields.left, node.left) & Predicate::gt(&fields.right, node.right)
        };
        let pred = self.index().scope_predicate(self.index().scope_of(&node)) & bounds;
        let rows = self.store.fetch(&pred, &[OrderBy::asc(&fields.left)])?;

        Ok(self.decode(rows))
    }

    /// Path labels joined by `options.separator`.
    pub fn path_as_string(&self, id: NodeId, options: &PathOptions) -> Result<String, TreeError> {
        if let Some(field) = &options.label_field
            && !self.store.has_field(field)
        {
            return Err(TreeError::invalid_argument(format!(
                "label field '{field}' is not present on store rows"
            )));
        }

        let labels = self
            .path(id, options.include_node)?
            .into_iter()
            .map(
                |node| match options.label_field.as_deref().and_then(|f| node.attr(f)) {
                    Some(value) if !value.is_null() => value.to_string(),
                    _ => node.id.map(|id| id.to_string()).unwrap_or_default(),
                },
            )
            .collect::<Vec<_>>();

        Ok(labels.join(&options.separator))
    }

    /// Descendants of `node`, or of the whole store when `node` is `None`.
    pub fn children(
        &self,
        node: Option<NodeId>,
        options: &ChildrenOptions,
    ) -> Result<Vec<Node>, TreeError> {
        let order = self.order_or_left(&options.sort)?;
        let pred = self.children_predicate(node, options.direct, options.include_node)?;

        Ok(self.decode(self.store.fetch(&pred, &order)?))
    }

    pub fn child_count(&self, node: Option<NodeId>, direct: bool) -> Result<u64, TreeError> {
        let pred = self.children_predicate(node, direct, false)?;

        Ok(self.store.count(&pred)?)
    }

    /// Descendants in display order: by tree, then by `left`.
    pub fn hierarchy(
        &self,
        node: Option<NodeId>,
        direct: bool,
        include_node: bool,
    ) -> Result<Vec<Node>, TreeError> {
        let fields = &self.config.fields;
        let mut order = Vec::with_capacity(2);
        if let Some(root) = &fields.root {
            order.push(OrderBy::asc(root));
        }
        order.push(OrderBy::asc(&fields.left));

        let pred = self.children_predicate(node, direct, include_node)?;

        Ok(self.decode(self.store.fetch(&pred, &order)?))
    }

    /// Leaf nodes. Forests require a node of the tree to search.
    pub fn leaf_nodes(
        &self,
        tree: Option<NodeId>,
        sort: Option<OrderBy>,
    ) -> Result<Vec<Node>, TreeError> {
        let fields = &self.config.fields;
        let mut pred = Predicate::field_cmp(&fields.right, CompareOp::Eq, &fields.left, 1);

        if let Some(root_field) = &fields.root {
            let Some(tree) = tree else {
                return Err(TreeError::invalid_operation(
                    "leaf nodes of a forest require a node of the tree to search",
                ));
            };
            let member = self.node(tree)?;
            let Some(root) = member.root else {
                return Err(TreeError::invalid_argument(format!(
                    "node [{tree}] is not assigned to a tree"
                )));
            };
            pred = pred & Predicate::eq(root_field, root);
        }

        let order = match sort {
            Some(key) => self.order_or_left(&[key])?,
            None => {
                let mut order = Vec::with_capacity(2);
                if let Some(root) = &fields.root {
                    order.push(OrderBy::asc(root));
                }
                order.push(OrderBy::asc(&fields.left));
                order
            }
        };

        Ok(self.decode(self.store.fetch(&pred, &order)?))
    }

    /// Siblings after `id`, nearest first.
    pub fn next_siblings(&self, id: NodeId, include_self: bool) -> Result<Vec<Node>, TreeError> {
        let node = self.node(id)?;
        let left = &self.config.fields.left;
        let bound = if include_self {
            Predicate::gte(left, node.left)
        } else {
            Predicate::gt(left, node.left)
        };

        self.siblings(&node, bound)
    }

    /// Siblings before `id`, in `left` order (farthest first).
    pub fn prev_siblings(&self, id: NodeId, include_self: bool) -> Result<Vec<Node>, TreeError> {
        let node = self.node(id)?;
        let left = &self.config.fields.left;
        let bound = if include_self {
            Predicate::lte(left, node.left)
        } else {
            Predicate::lt(left, node.left)
        };

        self.siblings(&node, bound)
    }

    fn siblings(&self, node: &Node, bound: Predicate) -> Result<Vec<Node>, TreeError> {
        if self.config.is_forest() && node.parent.is_none() {
            return Err(TreeError::invalid_operation(
                "Cannot get siblings from tree root node",
            ));
        }

        let fields = &self.config.fields;
        let pred = Predicate::eq_ref(&fields.parent, node.parent)
            & self.index().scope_predicate(self.index().scope_of(node))
            & bound;
        let rows = self.store.fetch(&pred, &[OrderBy::asc(&fields.left)])?;

        Ok(self.decode(rows))
    }

    fn children_predicate(
        &self,
        node: Option<NodeId>,
        direct: bool,
        include_node: bool,
    ) -> Result<Predicate, TreeError> {
        let fields = &self.config.fields;

        let Some(id) = node else {
            return Ok(if direct {
                Predicate::is_null(&fields.parent)
            } else {
                Predicate::True
            });
        };

        let node = self.node(id)?;
        let within = if direct {
            Predicate::eq(&fields.parent, id)
        } else {
            Predicate::gt(&fields.left, node.left) & Predicate::lt(&fields.right, node.right)
        };
        let pred = self.index().scope_predicate(self.index().scope_of(&node)) & within;

        Ok(if include_node {
            pred | Predicate::IdEq(id)
        } else {
            pred
        })
    }
}
