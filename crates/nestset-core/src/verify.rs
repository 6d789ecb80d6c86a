//! Consistency audit over stored bounds.
//!
//! Violations are data, not errors: `verify` only fails when the store does.


use crate::{
    config::TreeConfig,
    error::TreeError,
    node::{Node, NodeId},
    obs::sink::{self, MetricsEvent, OpKind, Span},
    store::{NodeStore, Predicate},
    tree::NestedTree,
};
use std::{collections::BTreeMap, fmt};
use tracing::debug;

///
/// VerifyOptions
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VerifyOptions {
    /// Forest only: check this root's tree instead of every tree.
    pub tree_root: Option<NodeId>,
}

///
/// Verification
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verification {
    Valid,
    Invalid(Vec<Violation>),
}

impl Verification {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Valid => &[],
            Self::Invalid(violations) => violations,
        }
    }

    /// Rendered descriptors, one per violation.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.violations().iter().map(ToString::to_string).collect()
    }
}

///
/// Violation
///
/// One detected inconsistency. `tree` is set in forest mode for checks that
/// run per tree.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Violation {
    MissingIndex {
        index: i64,
        tree: Option<NodeId>,
    },
    /// Run of missing indexes past the per-index reporting budget.
    MissingIndexRange {
        from: i64,
        to: i64,
        tree: Option<NodeId>,
    },
    DuplicateIndex {
        index: i64,
        tree: Option<NodeId>,
    },
    MissingParent {
        node: NodeId,
        tree: Option<NodeId>,
    },
    LeftGreaterThanRight {
        node: NodeId,
        tree: Option<NodeId>,
    },
    InvalidBounds {
        node: NodeId,
    },
    IdenticalBounds {
        node: NodeId,
    },
    LeftBeforeParent {
        node: NodeId,
        parent: NodeId,
    },
    RightAfterParent {
        node: NodeId,
        parent: NodeId,
    },
    LevelAfterParent {
        node: NodeId,
        parent: NodeId,
    },
    RootLevel {
        node: NodeId,
        expected: i64,
        actual: Option<i64>,
    },
    ContainedRoot {
        node: NodeId,
    },
}

impl Violation {
    /// Offending node, when the violation is about a single node.
    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        match self {
            Self::MissingIndex { .. }
            | Self::MissingIndexRange { .. }
            | Self::DuplicateIndex { .. } => None,
            Self::MissingParent { node, .. }
            | Self::LeftGreaterThanRight { node, .. }
            | Self::InvalidBounds { node }
            | Self::IdenticalBounds { node }
            | Self::LeftBeforeParent { node, .. }
            | Self::RightAfterParent { node, .. }
            | Self::LevelAfterParent { node, .. }
            | Self::RootLevel { node, .. }
            | Self::ContainedRoot { node } => Some(*node),
        }
    }
}

struct TreeSuffix(Option<NodeId>);

impl fmt::Display for TreeSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(root) => write!(f, " on tree root: {root}"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIndex { index, tree } => {
                write!(f, "index [{index}], missing{}", TreeSuffix(*tree))
            }
            Self::MissingIndexRange { from, to, tree } => {
                write!(f, "indexes [{from}..{to}], missing{}", TreeSuffix(*tree))
            }
            Self::DuplicateIndex { index, tree } => {
                write!(f, "index [{index}], duplicate{}", TreeSuffix(*tree))
            }
            Self::MissingParent { node, tree } => {
                write!(f, "node [{node}] has missing parent{}", TreeSuffix(*tree))
            }
            Self::LeftGreaterThanRight { node, tree } => {
                write!(f, "node [{node}], left is greater than right{}", TreeSuffix(*tree))
            }
            Self::InvalidBounds { node } => {
                write!(f, "node [{node}] has invalid left or right values")
            }
            Self::IdenticalBounds { node } => {
                write!(f, "node [{node}] has identical left and right values")
            }
            Self::LeftBeforeParent { node, parent } => write!(
                f,
                "node [{node}] left is less than parent`s [{parent}] left value"
            ),
            Self::RightAfterParent { node, parent } => write!(
                f,
                "node [{node}] right is greater than parent`s [{parent}] right value"
            ),
            Self::LevelAfterParent { node, parent } => write!(
                f,
                "node [{node}] should be on the level right after its parent`s [{parent}] level"
            ),
            Self::RootLevel {
                node,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(f, "node [{node}] should be on level {expected}, not {actual}"),
                None => write!(f, "node [{node}] should be on level {expected}, not null"),
            },
            Self::ContainedRoot { node } => {
                write!(f, "node [{node}] parent field is blank, but it has a parent")
            }
        }
    }
}

/// Audit every tree in `store` (or only `options.tree_root` in a forest).
///
/// Loads every row once. Index coverage costs O(rows) regardless of how far
/// a corrupted bound points; long gaps are reported as ranges.
pub fn verify<S: NodeStore + ?Sized>(
    store: &S,
    config: &TreeConfig,
    options: &VerifyOptions,
) -> Result<Verification, TreeError> {
    let nodes = store
        .fetch(&Predicate::True, &[])?
        .iter()
        .map(|row| (row.id, Node::from_row(row, &config.fields)))
        .collect::<BTreeMap<_, _>>();
    if nodes.is_empty() {
        return Ok(Verification::Valid);
    }

    let audit = Audit { config, nodes: &nodes };
    let mut violations = Vec::new();

    if config.is_forest() {
        let mut roots = nodes
            .values()
            .filter(|node| node.parent.is_none())
            .collect::<Vec<_>>();
        roots.sort_by_key(|node| node.left);

        for root in roots {
            if options.tree_root.is_some() && options.tree_root != root.id {
                continue;
            }
            let members = nodes
                .values()
                .filter(|node| node.root == root.root)
                .collect::<Vec<_>>();
            audit.check_tree(&members, root.root.or(root.id), &mut violations);
        }
    } else {
        let members = nodes.values().collect::<Vec<_>>();
        audit.check_tree(&members, None, &mut violations);
    }

    if violations.is_empty() {
        Ok(Verification::Valid)
    } else {
        Ok(Verification::Invalid(violations))
    }
}

///
/// GapReport
///
/// Missing-index reporting with a budget of one descriptor per bound slot
/// the tree's rows can hold. Gaps past the budget collapse into one range
/// violation each, so a single runaway bound stays cheap to audit.
///

struct GapReport {
    budget: usize,
    tree: Option<NodeId>,
}

impl GapReport {
    const fn new(rows: usize, tree: Option<NodeId>) -> Self {
        Self {
            budget: rows.saturating_mul(2),
            tree,
        }
    }

    fn report(&mut self, from: i64, to: i64, out: &mut Vec<Violation>) {
        let tree = self.tree;
        let mut index = from;
        while index <= to && self.budget > 0 {
            out.push(Violation::MissingIndex { index, tree });
            self.budget -= 1;
            index += 1;
        }
        if index <= to {
            out.push(Violation::MissingIndexRange {
                from: index,
                to,
                tree,
            });
        }
    }
}

struct Audit<'a> {
    config: &'a TreeConfig,
    nodes: &'a BTreeMap<NodeId, Node>,
}

impl Audit<'_> {
    /// Members are in id order.
    fn check_tree(&self, members: &[&Node], tree: Option<NodeId>, out: &mut Vec<Violation>) {
        let (Some(min), Some(max)) = (
            members.iter().map(|n| n.left).min(),
            members.iter().map(|n| n.right).max(),
        ) else {
            return;
        };

        // index coverage: each bound slot is held by exactly one node
        let mut holders = BTreeMap::<i64, u32>::new();
        for node in members {
            *holders.entry(node.left).or_default() += 1;
            if node.right != node.left {
                *holders.entry(node.right).or_default() += 1;
            }
        }
        let mut gaps = GapReport::new(members.len(), tree);
        let mut expected = min;
        for (&index, &count) in holders.range(min..=max) {
            gaps.report(expected, index - 1, out);
            if count > 1 {
                out.push(Violation::DuplicateIndex { index, tree });
            }
            expected = index + 1;
        }
        gaps.report(expected, max, out);

        let orphans = members
            .iter()
            .filter_map(|node| {
                let parent = node.parent?;
                (!self.nodes.contains_key(&parent)).then_some(node.id?)
            })
            .collect::<Vec<_>>();
        if !orphans.is_empty() {
            out.extend(
                orphans
                    .into_iter()
                    .map(|node| Violation::MissingParent { node, tree }),
            );
            // parent links are broken; containment checks would chase them
            return;
        }

        if let Some(node) = members
            .iter()
            .find(|n| n.right < n.left)
            .and_then(|n| n.id)
        {
            out.push(Violation::LeftGreaterThanRight { node, tree });
        }

        for node in members {
            let Some(id) = node.id else { continue };
            self.check_node(id, node, members, out);
        }
    }

    fn check_node(&self, id: NodeId, node: &Node, members: &[&Node], out: &mut Vec<Violation>) {
        if node.left < 1 || node.right < 1 {
            out.push(Violation::InvalidBounds { node: id });
            return;
        }
        if node.left == node.right {
            out.push(Violation::IdenticalBounds { node: id });
            return;
        }

        if let Some(parent_id) = node.parent {
            let Some(parent) = self.nodes.get(&parent_id) else {
                return;
            };
            if node.left < parent.left {
                out.push(Violation::LeftBeforeParent {
                    node: id,
                    parent: parent_id,
                });
            } else if node.right > parent.right {
                out.push(Violation::RightAfterParent {
                    node: id,
                    parent: parent_id,
                });
            }
            if self.config.tracks_level() {
                let in_step = matches!(
                    (node.level, parent.level),
                    (Some(level), Some(parent_level)) if level == parent_level + 1
                );
                if !in_step {
                    out.push(Violation::LevelAfterParent {
                        node: id,
                        parent: parent_id,
                    });
                }
            }
            return;
        }

        if let Some(expected) = self.config.root_level()
            && node.level != Some(expected)
        {
            out.push(Violation::RootLevel {
                node: id,
                expected,
                actual: node.level,
            });
        }

        let contained = members
            .iter()
            .any(|other| other.left < node.left && other.right > node.right);
        if contained {
            out.push(Violation::ContainedRoot { node: id });
        }
    }
}

impl<S: NodeStore> NestedTree<S> {
    /// Audit the stored bounds.
    pub fn verify(&self, options: &VerifyOptions) -> Result<Verification, TreeError> {
        let mut span = Span::new(OpKind::Verify);
        let verification = verify(self.store(), self.config(), options)?;

        let count = verification.violations().len() as u64;
        if count > 0 {
            debug!(count, "verification found violations");
            sink::record(MetricsEvent::ViolationsFound { count });
        }
        span.add_rows(count);
        span.finish();

        Ok(verification)
    }
}
