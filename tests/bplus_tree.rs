use std::collections::BTreeMap;
use std::ops::Bound;

use bplus_index::{BPlusTree, Key, Order, TreeError, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tracing_subscriber::prelude::*;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 2_000;

/// Installs a subscriber once so split/merge events show up under
/// `RUST_LOG=bplus_index=trace cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bplus_index=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn bytes(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Flattens a multimap model into the entry sequence the tree should yield.
fn model_entries(model: &BTreeMap<i32, Vec<u32>>) -> Vec<(i32, u32)> {
    model.iter().flat_map(|(&k, vs)| vs.iter().map(move |&v| (k, v))).collect()
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum TreeOp {
    Insert(i32),
    Delete(i32),
    Update(i32, u32),
    Search(i32),
    SearchRange(i32, i32),
}

/// Keys drawn from a small range so duplicate runs grow long enough to span leaves.
fn key_strategy() -> impl Strategy<Value = i32> {
    -100i32..100i32
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        6 => key_strategy().prop_map(TreeOp::Insert),
        3 => key_strategy().prop_map(TreeOp::Delete),
        1 => (key_strategy(), any::<u32>()).prop_map(|(k, v)| TreeOp::Update(k, v)),
        2 => key_strategy().prop_map(TreeOp::Search),
        1 => (key_strategy(), key_strategy()).prop_map(|(lo, hi)| TreeOp::SearchRange(lo, hi)),
    ]
}

// ─── Core operations against a multimap model ────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Replays random operations on the tree and on a `BTreeMap<K, Vec<V>>`
    /// and asserts identical results at every step.
    #[test]
    fn ops_match_multimap(order in 1usize..10, ops in proptest::collection::vec(tree_op_strategy(), TEST_SIZE)) {
        init_tracing();
        let mut tree: BPlusTree<i32, u32> = BPlusTree::new(order);
        let mut model: BTreeMap<i32, Vec<u32>> = BTreeMap::new();
        let mut next_value = 0u32;

        for op in &ops {
            match *op {
                TreeOp::Insert(k) => {
                    tree.insert(k, next_value);
                    model.entry(k).or_default().push(next_value);
                    next_value += 1;
                }
                TreeOp::Delete(k) => {
                    let expected = model.remove(&k).map_or(0, |vs| vs.len());
                    prop_assert_eq!(tree.delete(&k), expected, "delete({})", k);
                }
                TreeOp::Update(k, v) => {
                    let expected = model.get_mut(&k).map_or(0, |vs| {
                        vs.fill(v);
                        vs.len()
                    });
                    prop_assert_eq!(tree.update(&k, v), expected, "update({}, {})", k, v);
                }
                TreeOp::Search(k) => {
                    let expected = model.get(&k).and_then(|vs| vs.first());
                    prop_assert_eq!(tree.search(&k), expected, "search({})", k);
                }
                TreeOp::SearchRange(lo, hi) => {
                    let expected: Vec<&u32> = if lo <= hi {
                        model.range(lo..=hi).flat_map(|(_, vs)| vs.iter()).collect()
                    } else {
                        Vec::new()
                    };
                    prop_assert_eq!(tree.search_range(&lo, &hi), expected, "search_range({}, {})", lo, hi);
                }
            }
            let expected_len: usize = model.values().map(Vec::len).sum();
            prop_assert_eq!(tree.len(), expected_len, "len mismatch after {:?}", op);
        }

        let entries: Vec<(i32, u32)> = tree.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(entries, model_entries(&model));
    }

    /// Range iteration matches the model for every bound shape.
    #[test]
    fn range_matches_multimap(
        keys in proptest::collection::vec(key_strategy(), 0..500),
        lo in key_strategy(),
        hi in key_strategy(),
    ) {
        let mut tree: BPlusTree<i32, u32> = BPlusTree::new(4);
        let mut model: BTreeMap<i32, Vec<u32>> = BTreeMap::new();
        for (v, &k) in (0u32..).zip(&keys) {
            tree.insert(k, v);
            model.entry(k).or_default().push(v);
        }

        let bounds = [
            (Bound::Included(lo), Bound::Included(hi)),
            (Bound::Included(lo), Bound::Excluded(hi)),
            (Bound::Excluded(lo), Bound::Included(hi)),
            (Bound::Excluded(lo), Bound::Excluded(hi)),
            (Bound::Unbounded, Bound::Included(hi)),
            (Bound::Excluded(lo), Bound::Unbounded),
        ];
        for range in bounds {
            let inverted = match range {
                (Bound::Included(a), Bound::Included(b)) => a > b,
                (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => a >= b,
                _ => false,
            };
            let expected: Vec<(i32, u32)> = if inverted {
                Vec::new()
            } else {
                model.range(range).flat_map(|(&k, vs)| vs.iter().map(move |&v| (k, v))).collect()
            };
            let actual: Vec<(i32, u32)> = tree.range(range).map(|(&k, &v)| (k, v)).collect();
            prop_assert_eq!(actual, expected, "range {:?}", range);
        }
    }

    /// Inserting distinct keys and searching each returns its value; deleting
    /// a key removes it from `get_keys` entirely.
    #[test]
    fn distinct_keys_round_trip(order in 1usize..16, keys in proptest::collection::btree_set(any::<i32>(), 0..400)) {
        let mut tree = BPlusTree::new(order);
        for &k in &keys {
            tree.insert(k, k.wrapping_mul(3));
        }
        for &k in &keys {
            prop_assert_eq!(tree.search(&k), Some(&k.wrapping_mul(3)));
        }
        prop_assert_eq!(tree.get_keys(), keys.iter().copied().collect::<Vec<_>>());

        for &k in keys.iter().step_by(2) {
            prop_assert_eq!(tree.delete(&k), 1);
            prop_assert!(!tree.get_keys().contains(&k));
        }
        prop_assert!(tree.get_keys().windows(2).all(|w| w[0] < w[1]));
    }
}

// ─── Behaviour from the index contract ───────────────────────────────────────

#[test]
fn zero_order_is_rejected() {
    assert_eq!(BPlusTree::<Key, Value>::try_new(0).err(), Some(TreeError::InvalidOrder { order: 0 }));
    assert_eq!(Order::try_from(0usize), Err(TreeError::InvalidOrder { order: 0 }));
}

#[test]
#[should_panic(expected = "tree order must be >= 1")]
fn zero_order_is_fatal() {
    let _: BPlusTree = BPlusTree::new(0);
}

#[test]
fn empty_tree_queries() {
    let tree: BPlusTree = BPlusTree::new(4);
    assert_eq!(tree.height(), 1);
    assert!(tree.get_keys().is_empty());
    assert!(tree.get_values().is_empty());
    assert_eq!(tree.search(b"missing".as_slice()), None);
    assert!(tree.search_range(b"a".as_slice(), b"z".as_slice()).is_empty());
    assert_eq!(tree.first_key_value(), None);
}

#[test]
fn duplicate_keys_resolve_in_insertion_order() {
    init_tracing();
    let mut tree: BPlusTree = BPlusTree::new(4);
    let k = bytes("k");
    tree.insert(k.clone(), bytes("v1"));
    tree.insert(k.clone(), bytes("v2"));

    assert_eq!(tree.search_range(&k, &k), [&bytes("v1"), &bytes("v2")]);
    assert_eq!(tree.search(&k), Some(&bytes("v1")));

    assert_eq!(tree.update(&k, bytes("v3")), 2);
    assert_eq!(tree.search_range(&k, &k), [&bytes("v3"), &bytes("v3")]);

    assert_eq!(tree.delete(&k), 2);
    assert_eq!(tree.search(&k), None);
    assert!(tree.is_empty());
}

#[test]
fn range_over_odd_keys() {
    let mut tree = BPlusTree::new(4);
    for k in [1, 3, 5, 7, 9] {
        tree.insert(k, format!("v{k}"));
    }
    assert_eq!(tree.search_range(&2, &7), [&"v3".to_string(), &"v5".to_string(), &"v7".to_string()]);
}

#[test]
fn byte_keys_order_lexicographically() {
    let mut tree: BPlusTree = BPlusTree::new(3);
    for word in ["pear", "apple", "fig", "banana", "apricot", "cherry", "app"] {
        tree.insert(bytes(word), bytes(&word.to_uppercase()));
    }

    let keys: Vec<String> = tree.keys().map(|k| String::from_utf8_lossy(k).into_owned()).collect();
    assert_eq!(keys, ["app", "apple", "apricot", "banana", "cherry", "fig", "pear"]);

    let found = tree.search_range(b"apq".as_slice(), b"c".as_slice());
    assert_eq!(found, [&bytes("APRICOT"), &bytes("BANANA")]);
}

#[test]
fn ascending_inserts_then_reverse_deletes_shrink_to_one_leaf() {
    init_tracing();
    let order = 4;
    let mut tree = BPlusTree::new(order);
    let keys: Vec<usize> = (0..order * 3).collect();

    for &k in &keys {
        tree.insert(k, k * 10);
    }
    assert!(tree.height() > 1);
    assert_eq!(tree.get_keys(), keys);

    for &k in keys.iter().rev() {
        assert_eq!(tree.delete(&k), 1);
        assert!(!tree.get_keys().contains(&k));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert!(tree.get_keys().is_empty());
}

#[test]
fn update_missing_key_does_not_insert() {
    let mut tree = BPlusTree::new(2);
    tree.extend([(1, 'a'), (2, 'b')]);
    assert_eq!(tree.update(&3, 'c'), 0);
    assert_eq!(tree.delete(&3), 0);
    assert_eq!(tree.get_keys(), [1, 2]);
    assert_eq!(tree.get_values(), ['a', 'b']);
}

#[test]
fn long_duplicate_run_survives_splits_and_deletes() {
    init_tracing();
    let mut tree = BPlusTree::new(2);
    tree.insert(0, 0);
    for v in 1..=50 {
        tree.insert(7, v);
    }
    tree.insert(99, 0);
    assert!(tree.height() > 2);

    assert_eq!(tree.search(&7), Some(&1));
    assert_eq!(tree.search_range(&7, &7).len(), 50);
    assert_eq!(tree.range(1..99).count(), 50);

    assert_eq!(tree.delete(&7), 50);
    assert_eq!(tree.get_keys(), [0, 99]);
    assert!(tree.height() <= 2);
}

#[test]
fn clear_keeps_order() {
    let mut tree: BPlusTree<u8, u8> = (0..=255).map(|k| (k, k)).collect();
    assert_eq!(tree.order(), Order::DEFAULT.get());
    tree.clear();
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.order(), Order::DEFAULT.get());
}

#[test]
fn iterators_agree_with_collected_views() {
    let mut tree = BPlusTree::new(3);
    for k in (0..40).rev() {
        tree.insert(k % 13, k);
    }
    let keys: Vec<_> = tree.keys().copied().collect();
    let values: Vec<_> = tree.values().copied().collect();
    assert_eq!(keys, tree.get_keys());
    assert_eq!(values, tree.get_values());
    assert_eq!(tree.iter().len(), 40);
    assert_eq!((&tree).into_iter().count(), 40);
}
