use crate::{
    config::TreeConfig,
    error::TreeError,
    node::NodeId,
    obs::{MetricsEvent, with_metrics_sink},
    recover::{RecoverOptions, recover, recover_fast},
    store::{Direction, MemoryStore, OrderBy},
    test_support::{Capture, TITLE, assert_valid, bounds, put, raw, rows},
    tree::NestedTree,
};
use std::rc::Rc;

fn id(raw: u64) -> NodeId {
    NodeId::new(raw)
}

/// `A → C(→ D), B` with every bound and most levels wrong. Stored `left`
/// order puts C before B.
fn scrambled() -> NestedTree<MemoryStore> {
    let config = TreeConfig::single();
    let mut store = MemoryStore::for_config(&config, &[TITLE]);
    put(&mut store, &config, 1, "A", raw(None, 5, 5, Some(0)));
    put(&mut store, &config, 2, "B", raw(Some(1), 9, 1, None));
    put(&mut store, &config, 3, "C", raw(Some(1), 2, 8, Some(4)));
    put(&mut store, &config, 4, "D", raw(Some(3), 0, 0, Some(0)));

    NestedTree::new(store, config).expect("tree should bind")
}

fn levels(tree: &NestedTree<MemoryStore>) -> Vec<(NodeId, Option<i64>)> {
    [1, 2, 3, 4]
        .into_iter()
        .map(|raw_id| {
            let node = tree.node(id(raw_id)).expect("node should exist");
            (id(raw_id), node.level)
        })
        .collect()
}

#[test]
fn recover_rebuilds_bounds_in_stored_order() {
    let mut tree = scrambled();

    let report = tree
        .recover(&RecoverOptions::default())
        .expect("recover should succeed")
        .expect("broken tree should be recovered");

    assert_eq!(report.trees, 1);
    assert_eq!(report.nodes_visited, 4);
    assert_eq!(report.rows_updated, 4);
    assert!(report.unreachable.is_empty());
    assert_eq!(bounds(&tree, id(1)), (1, 8));
    assert_eq!(bounds(&tree, id(3)), (2, 5));
    assert_eq!(bounds(&tree, id(4)), (3, 4));
    assert_eq!(bounds(&tree, id(2)), (6, 7));
    assert_eq!(
        levels(&tree),
        [
            (id(1), Some(0)),
            (id(2), Some(1)),
            (id(3), Some(1)),
            (id(4), Some(2)),
        ]
    );
    assert_valid(&tree);
}

#[test]
fn recover_fast_matches_hydrated_pass() {
    let mut hydrated = scrambled();
    let mut fast = scrambled();

    hydrated
        .recover(&RecoverOptions::default())
        .expect("recover should succeed");
    let report = fast
        .recover_fast(&RecoverOptions::default())
        .expect("recover should succeed")
        .expect("broken tree should be recovered");

    assert_eq!(rows(fast.store()), rows(hydrated.store()));
    assert_eq!(report.rows_updated, 4);
    for raw_id in 1..=4 {
        assert!(fast.store().evicted().contains(&id(raw_id)));
    }
}

#[test]
fn valid_tree_is_skipped_unless_forced() {
    let mut tree = scrambled();
    tree.recover(&RecoverOptions::default())
        .expect("recover should succeed");

    let skipped = tree
        .recover(&RecoverOptions::default())
        .expect("recover should succeed");
    let forced = tree
        .recover_fast(&RecoverOptions {
            skip_verify: true,
            ..RecoverOptions::default()
        })
        .expect("recover should succeed");

    assert!(skipped.is_none());
    let forced = forced.expect("skip_verify should force a pass");
    assert_eq!(forced.nodes_visited, 4);
}

#[test]
fn sort_option_orders_siblings() {
    let mut tree = scrambled();

    tree.recover(&RecoverOptions {
        sort: Some(OrderBy::asc(TITLE)),
        ..RecoverOptions::default()
    })
    .expect("recover should succeed");

    assert_eq!(bounds(&tree, id(2)), (2, 3));
    assert_eq!(bounds(&tree, id(3)), (4, 7));
    assert_eq!(bounds(&tree, id(4)), (5, 6));
    assert_valid(&tree);
}

#[test]
fn unknown_sort_field_is_rejected() {
    let mut tree = scrambled();
    let before = rows(tree.store());

    let err = tree
        .recover(&RecoverOptions {
            sort: Some(OrderBy::new("weight", Direction::Desc)),
            ..RecoverOptions::default()
        })
        .expect_err("unknown sort field should be rejected");

    assert!(matches!(err, TreeError::InvalidArgument(_)));
    assert_eq!(
        err.to_string(),
        "invalid argument: Invalid sort options specified: field - weight, direction - DESC"
    );
    assert_eq!(rows(tree.store()), before);
}

#[test]
fn forest_recovery_can_target_one_tree() {
    let config = TreeConfig::forest();
    let mut store = MemoryStore::for_config(&config, &[TITLE]);
    for (raw_id, parent, left, right, root) in [
        (1, None, 1, 9, 1),
        (2, Some(1), 4, 4, 1),
        (3, None, 7, 3, 3),
        (4, Some(3), 8, 2, 3),
    ] {
        let mut node = raw(parent, left, right, Some(0));
        node.root = Some(id(root));
        put(&mut store, &config, raw_id, "n", node);
    }
    let first_tree = |store: &MemoryStore| [store.get(id(1)), store.get(id(2))];
    let untouched = first_tree(&store);

    let report = recover(
        &mut store,
        &config,
        &RecoverOptions {
            tree_root: Some(id(3)),
            ..RecoverOptions::default()
        },
    )
    .expect("recover should succeed")
    .expect("broken tree should be recovered");

    assert_eq!(report.trees, 1);
    assert_eq!(first_tree(&store), untouched);
    let tree = NestedTree::new(store, config).expect("tree should bind");
    assert_eq!(bounds(&tree, id(3)), (1, 4));
    assert_eq!(bounds(&tree, id(4)), (2, 3));
    let child = tree.node(id(4)).expect("node should exist");
    assert_eq!((child.level, child.root), (Some(1), Some(id(3))));
}

#[test]
fn forest_recovery_restarts_numbering_per_tree() {
    let config = TreeConfig::forest();
    let mut store = MemoryStore::for_config(&config, &[TITLE]);
    put(&mut store, &config, 1, "R", raw(None, 3, 3, None));
    put(&mut store, &config, 2, "S", raw(None, 1, 1, None));
    put(&mut store, &config, 3, "C", raw(Some(2), 2, 2, None));

    recover_fast(
        &mut store,
        &config,
        &RecoverOptions {
            skip_verify: true,
            ..RecoverOptions::default()
        },
    )
    .expect("recover should succeed");

    let tree = NestedTree::new(store, config).expect("tree should bind");
    assert_eq!(bounds(&tree, id(1)), (1, 2));
    assert_eq!(bounds(&tree, id(2)), (1, 4));
    assert_eq!(tree.node(id(3)).expect("node should exist").root, Some(id(2)));
    assert_valid(&tree);
}

#[test]
fn parent_cycles_are_reported_unreachable() {
    let config = TreeConfig::single();
    let mut store = MemoryStore::for_config(&config, &[TITLE]);
    put(&mut store, &config, 1, "R", raw(None, 1, 2, Some(0)));
    put(&mut store, &config, 2, "X", raw(Some(3), 3, 4, Some(1)));
    put(&mut store, &config, 3, "Y", raw(Some(2), 5, 6, Some(1)));

    let report = recover(
        &mut store,
        &config,
        &RecoverOptions {
            skip_verify: true,
            ..RecoverOptions::default()
        },
    )
    .expect("recover should succeed")
    .expect("skip_verify should force a pass");

    assert_eq!(report.unreachable, [id(2), id(3)]);
    assert_eq!(report.nodes_visited, 1);
    assert_eq!(report.rows_updated, 0);
}

#[test]
fn recovery_reports_visited_nodes() {
    let mut tree = scrambled();
    let capture = Rc::new(Capture::default());

    with_metrics_sink(capture.clone(), || {
        tree.recover(&RecoverOptions::default())
            .expect("recover should succeed");
    });

    assert!(
        capture
            .events()
            .contains(&MetricsEvent::NodesRecovered { count: 4 })
    );
}

#[test]
fn report_serializes_for_callers() {
    let mut tree = scrambled();
    let report = tree
        .recover(&RecoverOptions::default())
        .expect("recover should succeed")
        .expect("broken tree should be recovered");

    let json = serde_json::to_value(&report).expect("report should serialize");

    assert_eq!(json["nodes_visited"], 4);
    assert_eq!(json["unreachable"], serde_json::json!([]));
}

#[test]
fn deep_parent_chain_is_numbered_without_recursion() {
    const DEPTH: u64 = 1_500;

    for fast in [false, true] {
        let config = TreeConfig::single();
        let mut store = MemoryStore::for_config(&config, &[TITLE]);
        for raw_id in 1..=DEPTH {
            let parent = (raw_id > 1).then(|| raw_id - 1);
            put(&mut store, &config, raw_id, "n", raw(parent, 0, 0, None));
        }
        let options = RecoverOptions {
            skip_verify: true,
            ..RecoverOptions::default()
        };

        let report = if fast {
            recover_fast(&mut store, &config, &options)
        } else {
            recover(&mut store, &config, &options)
        }
        .expect("recover should succeed")
        .expect("skip_verify should force a pass");

        assert_eq!(report.nodes_visited, DEPTH);
        let tree = NestedTree::new(store, config).expect("tree should bind");
        let depth = i64::try_from(DEPTH).expect("depth should fit");
        assert_eq!(bounds(&tree, id(1)), (1, 2 * depth));
        assert_eq!(bounds(&tree, id(DEPTH)), (depth, depth + 1));
        assert_eq!(tree.node(id(DEPTH)).expect("node should exist").level, Some(depth - 1));
        assert_valid(&tree);
    }
}
