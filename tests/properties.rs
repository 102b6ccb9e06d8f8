//! Property tests over randomly generated value graphs.

use deepdiff_kernel::{
    decode_tree, diff, dump, encode_tree, load, AllowList, Category, DiffConfig, TypeRegistry, Value,
};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Int),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        "[a-z]{0,6}".prop_map(Value::Str),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Tuple),
            prop::collection::vec(("[a-c]{1,2}", inner), 0..5)
                .prop_map(|pairs| Value::dict(pairs.into_iter().map(|(k, v)| (Value::Str(k), v)))),
            prop::collection::vec(-20i64..20, 0..6).prop_map(Value::set),
        ]
    })
}

fn tree_paths(tree: &deepdiff_kernel::TextView, category: Category) -> Vec<String> {
    tree.paths(category).into_iter().map(str::to_string).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn test_self_diff_is_empty(v in value()) {
        prop_assert!(diff(&v, &v, &DiffConfig::default()).unwrap().is_empty());
        let unordered = DiffConfig::default().with_ignore_order(true);
        prop_assert!(diff(&v, &v, &unordered).unwrap().is_empty());
    }

    #[test]
    fn test_tree_document_round_trip(a in value(), b in value()) {
        let tree = diff(&a, &b, &DiffConfig::default()).unwrap();
        let back = decode_tree(&encode_tree(&tree), &AllowList::new(), &TypeRegistry::new()).unwrap();
        prop_assert_eq!(back, tree);
    }

    #[test]
    fn test_payload_round_trip(v in value()) {
        let payload = dump(&v).unwrap();
        prop_assert_eq!(load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap(), v);
    }

    #[test]
    fn test_lower_verbosity_never_adds_paths(a in value(), b in value()) {
        let tree = diff(&a, &b, &DiffConfig::default()).unwrap();
        let quiet = tree.to_text(0);
        let loud = tree.to_text(2);
        for category in Category::ALL {
            let quiet_paths = tree_paths(&quiet, category);
            let loud_paths = tree_paths(&loud, category);
            for path in &quiet_paths {
                prop_assert!(loud_paths.contains(path), "{} missing at level 2", path);
            }
        }
    }

    #[test]
    fn test_reversal_is_invisible_when_ignoring_order(items in prop::collection::vec(value(), 0..6)) {
        let forward = Value::List(items.clone());
        let backward = Value::List(items.into_iter().rev().collect());
        let config = DiffConfig::default().with_ignore_order(true);
        prop_assert!(diff(&forward, &backward, &config).unwrap().is_empty());
    }

    #[test]
    fn test_excluded_subtree_never_shows_up(a in value(), b in value(), unordered in any::<bool>()) {
        let wrap = |meta: Value| Value::list([Value::dict([(Value::from("id"), Value::Int(1)), (Value::from("meta"), meta)])]);
        let config = DiffConfig::default()
            .with_ignore_order(unordered)
            .with_exclude_path("root[0]['meta']");
        prop_assert!(diff(&wrap(a), &wrap(b), &config).unwrap().is_empty());
    }

    #[test]
    fn test_pretty_has_one_line_per_entry(a in value(), b in value()) {
        let tree = diff(&a, &b, &DiffConfig::default()).unwrap();
        let pretty = tree.pretty();
        let lines = if pretty.is_empty() { 0 } else { pretty.lines().count() };
        prop_assert_eq!(lines, tree.len());
    }
}
