//! Property-based tests for the bounding box tree.
//!
//! These tests compare the tree against brute-force answers over random
//! scenes and check the structural invariants after every mutation.
//!
//! Run with: cargo test -p cf-spatial -- proptest

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::BTreeSet;

use cf_spatial::{Aabb, BBTree};
use nalgebra::{Point2, Vector2};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

/// A box somewhere in a 20x20 world, at most 3 units on a side.
fn arb_aabb() -> impl Strategy<Value = Aabb> {
    (0.0..20.0f64, 0.0..20.0f64, 0.1..3.0f64, 0.1..3.0f64)
        .prop_map(|(x, y, w, h)| Aabb::from_edges(x, y, x + w, y + h))
}

fn arb_scene(max: usize) -> impl Strategy<Value = Vec<Aabb>> {
    prop::collection::vec(arb_aabb(), 1..max)
}

fn arb_offset() -> impl Strategy<Value = Vector2<f64>> {
    (-4.0..4.0f64, -4.0..4.0f64).prop_map(|(x, y)| Vector2::new(x, y))
}

// =============================================================================
// Helpers
// =============================================================================

fn build(boxes: &[Aabb], order: &[usize]) -> BBTree<usize> {
    let mut tree = BBTree::new();
    for &key in order {
        tree.insert(key, &|i: usize| boxes[i]).unwrap();
    }
    tree
}

fn brute_query(boxes: &[Aabb], keys: &BTreeSet<usize>, region: &Aabb) -> BTreeSet<usize> {
    keys.iter()
        .copied()
        .filter(|&k| boxes[k].intersects(region))
        .collect()
}

fn brute_pairs(boxes: &[Aabb]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if boxes[i].intersects(&boxes[j]) {
                out.push((i, j));
            }
        }
    }
    out
}

fn tree_query(tree: &BBTree<usize>, region: &Aabb) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    tree.query(region, |key| {
        assert!(out.insert(key), "key {key} reported twice");
    });
    out
}

fn tree_pairs(tree: &mut BBTree<usize>, boxes: &[Aabb]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    tree.reindex_query(&|i: usize| boxes[i], |a, b| out.push((a.min(b), a.max(b))));
    out.sort_unstable();
    out
}

fn translate(bb: &Aabb, offset: &Vector2<f64>) -> Aabb {
    Aabb::new(bb.min + offset, bb.max + offset)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn proptest_query_matches_brute_force(
        boxes in arb_scene(40),
        region in arb_aabb(),
        seed in any::<u64>(),
    ) {
        // A deterministic shuffle of the insertion order.
        let mut order: Vec<usize> = (0..boxes.len()).collect();
        order.sort_by_key(|&k| (k as u64).wrapping_mul(seed | 1).rotate_left(17));

        let tree = build(&boxes, &order);
        tree.validate().unwrap();

        let keys: BTreeSet<usize> = (0..boxes.len()).collect();
        prop_assert_eq!(tree_query(&tree, &region), brute_query(&boxes, &keys, &region));
    }

    #[test]
    fn proptest_reindex_reports_every_overlap_once(
        boxes in arb_scene(30),
        moves in prop::collection::vec((any::<prop::sample::Index>(), arb_offset()), 0..10),
    ) {
        let order: Vec<usize> = (0..boxes.len()).collect();
        let mut tree = build(&boxes, &order);
        let mut current = boxes.clone();

        prop_assert_eq!(tree_pairs(&mut tree, &current), brute_pairs(&current));

        for (index, offset) in moves {
            let key = index.index(current.len());
            current[key] = translate(&current[key], &offset);

            let reported = tree_pairs(&mut tree, &current);
            tree.validate().unwrap();

            let unique: BTreeSet<_> = reported.iter().copied().collect();
            prop_assert_eq!(unique.len(), reported.len());
            prop_assert_eq!(reported, brute_pairs(&current));
        }
    }

    #[test]
    fn proptest_remove_then_query(
        boxes in arb_scene(40),
        removed in prop::collection::btree_set(0..40usize, 0..20),
        region in arb_aabb(),
    ) {
        let order: Vec<usize> = (0..boxes.len()).collect();
        let mut tree = build(&boxes, &order);

        let mut keys: BTreeSet<usize> = order.iter().copied().collect();
        for key in removed.into_iter().filter(|k| *k < boxes.len()) {
            tree.remove(key).unwrap();
            keys.remove(&key);
            tree.validate().unwrap();
        }

        prop_assert_eq!(tree.len(), keys.len());
        prop_assert_eq!(tree_query(&tree, &region), brute_query(&boxes, &keys, &region));

        // Reinsert everything; the tree must look like a fresh one to queries.
        for key in 0..boxes.len() {
            if !keys.contains(&key) {
                tree.insert(key, &|i: usize| boxes[i]).unwrap();
            }
        }
        tree.validate().unwrap();
        prop_assert_eq!(tree_pairs(&mut tree, &boxes), brute_pairs(&boxes));
    }

    #[test]
    fn proptest_segment_returns_nearest_hit(
        boxes in arb_scene(40),
        start in (-5.0..25.0f64, -5.0..25.0f64),
        end in (-5.0..25.0f64, -5.0..25.0f64),
    ) {
        let order: Vec<usize> = (0..boxes.len()).collect();
        let tree = build(&boxes, &order);
        let start = Point2::new(start.0, start.1);
        let end = Point2::new(end.0, end.1);

        let t = tree.segment_query(&start, &end, 1.0, |key| {
            boxes[key].segment_fraction(&start, &end)
        });

        let expected = boxes
            .iter()
            .map(|bb| bb.segment_fraction(&start, &end))
            .fold(1.0_f64, f64::min);
        prop_assert_eq!(t, expected);
    }

    #[test]
    fn proptest_optimize_keeps_answers(
        boxes in arb_scene(60),
        region in arb_aabb(),
    ) {
        let order: Vec<usize> = (0..boxes.len()).collect();
        let mut tree = build(&boxes, &order);
        let keys: BTreeSet<usize> = order.iter().copied().collect();

        tree.optimize();
        tree.validate().unwrap();

        prop_assert_eq!(tree_query(&tree, &region), brute_query(&boxes, &keys, &region));
        prop_assert_eq!(tree_pairs(&mut tree, &boxes), brute_pairs(&boxes));
    }
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn identical_operations_report_identical_sequences() {
    let boxes: Vec<Aabb> = (0..50_i32)
        .map(|i| {
            let i = f64::from(i);
            Aabb::from_edges((i * 1.7) % 12.0, (i * 2.3) % 9.0, (i * 1.7) % 12.0 + 1.5, (i * 2.3) % 9.0 + 1.5)
        })
        .collect();

    let run = || {
        let order: Vec<usize> = (0..boxes.len()).collect();
        let mut tree = build(&boxes, &order);
        let mut moved = boxes.clone();
        for bb in moved.iter_mut().step_by(7) {
            *bb = translate(bb, &Vector2::new(0.9, -0.4));
        }
        let mut sequence = Vec::new();
        tree.reindex_query(&|i: usize| moved[i], |a, b| sequence.push((a, b)));
        sequence
    };

    assert_eq!(run(), run());
}
