use nestset::prelude::*;

const CONFIG: &str = r#"
base_level = 0

[fields]
parent = "parent_id"
left = "lft"
right = "rgt"
level = "depth"
root = "tree_id"
"#;

fn catalog() -> NestedTree<MemoryStore> {
    let config = TreeConfig::from_toml_str(CONFIG).expect("config should parse");
    let store = MemoryStore::for_config(&config, &["name"]);

    NestedTree::new(store, config).expect("tree should bind")
}

fn named(name: &str) -> Node {
    Node::new().with_attr("name", name)
}

fn names(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|node| node.attr("name").map(ToString::to_string))
        .collect()
}

#[test]
fn catalog_lifecycle_through_public_surface() {
    let mut tree = catalog();

    let books = tree
        .insert(&mut named("Books"), None, Position::LastChild)
        .expect("insert should succeed");
    let fiction = tree
        .insert(&mut named("Fiction"), Some(books), Position::LastChild)
        .expect("insert should succeed");
    let poetry = tree
        .insert(&mut named("Poetry"), Some(fiction), Position::NextSibling)
        .expect("insert should succeed");
    let music = tree
        .insert(&mut named("Music"), None, Position::LastChild)
        .expect("insert should succeed");

    tree.move_to(poetry, Some(music), Position::FirstChild)
        .expect("move should succeed");

    let path = tree
        .path_as_string(
            poetry,
            &PathOptions {
                label_field: Some("name".to_string()),
                ..PathOptions::default()
            },
        )
        .expect("path should render");
    assert_eq!(path, "Music > Poetry");

    let roots = tree
        .root_nodes(Some(OrderBy::asc("name")))
        .expect("roots should load");
    assert_eq!(names(&roots), ["Books", "Music"]);

    let verification = tree
        .verify(&VerifyOptions::default())
        .expect("verify should run");
    assert!(verification.is_valid(), "{:?}", verification.messages());

    let report = tree
        .recover(&RecoverOptions {
            skip_verify: true,
            ..RecoverOptions::default()
        })
        .expect("recover should run")
        .expect("forced recovery should report");
    assert_eq!(report.trees, 2);
    assert_eq!(report.rows_updated, 0);
}

#[test]
fn rejections_surface_as_public_errors() {
    let mut tree = catalog();
    let root = tree
        .insert(&mut named("Root"), None, Position::LastChild)
        .expect("insert should succeed");

    let err: Error = tree
        .move_up(root, Steps::default())
        .expect_err("forest roots have no siblings")
        .into();

    assert_eq!(
        err.kind,
        ErrorKind::Request(nestset::error::RequestErrorKind::InvalidOperation)
    );
    assert_eq!(
        err.message,
        "invalid operation: Cannot get siblings from tree root node"
    );
}
