//! # Nested-Set (MPTT) Builder
//!
//! Derives traversal-efficient tree coordinates for a forest of taxonomic
//! trees from parent-pointer edges.
//!
//! ## Overview
//!
//! Each node receives `(left, right, tree_id, depth)` such that a node's
//! subtree is exactly the rows whose interval lies strictly inside its own.
//! Numbering is a preorder walk: a root gets left=1 and depth=0, each child
//! interval nests inside its parent, and a leaf's right is its left + 1, so
//! `right - left` is always odd and equals 2 x descendant_count + 1.
//!
//! Traversal order is deterministic: roots ascending by id (a root's
//! `tree_id` is its own id), siblings ascending by id. The walk is iterative
//! with an explicit stack, so arbitrarily deep taxonomies cannot overflow the
//! call stack.
//!
//! ## Failure modes
//!
//! A parent pointer to a non-existent node, a duplicated node id, or a cycle
//! in the parent pointers is reported as an error; the builder never fails to
//! terminate.

use crate::error::{Result, TaxonomyError};
use std::collections::{BTreeMap, BTreeSet};

/// Parent-pointer input to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxonNode {
    pub id: i64,
    pub parent_id: Option<i64>,
}

/// Nested-set coordinates assigned to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCoordinates {
    pub left: i64,
    pub right: i64,
    pub tree_id: i64,
    pub depth: i64,
}

/// Compute nested-set coordinates for a forest given as parent-pointer edges.
///
/// Returns a map from node id to its coordinates; the map covers every input
/// node exactly once.
///
/// # Errors
///
/// - [`TaxonomyError::DuplicateTaxonId`] if an id appears twice
/// - [`TaxonomyError::UnknownParent`] if a parent pointer has no target row
/// - [`TaxonomyError::CycleDetected`] if any node is unreachable from a root
pub fn build_forest(nodes: &[TaxonNode]) -> Result<BTreeMap<i64, NodeCoordinates>> {
    let mut ids = BTreeSet::new();
    for node in nodes {
        if !ids.insert(node.id) {
            return Err(TaxonomyError::DuplicateTaxonId(node.id));
        }
    }

    let mut children: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut roots = Vec::new();
    for node in nodes {
        match node.parent_id {
            None => roots.push(node.id),
            Some(parent) => {
                if !ids.contains(&parent) {
                    return Err(TaxonomyError::UnknownParent {
                        child: node.id,
                        parent,
                    });
                }
                children.entry(parent).or_default().push(node.id);
            }
        }
    }

    roots.sort_unstable();
    for siblings in children.values_mut() {
        siblings.sort_unstable();
    }

    let mut coords: BTreeMap<i64, NodeCoordinates> = BTreeMap::new();
    for &root in &roots {
        // Preorder interval numbering restarts at 1 for each tree.
        let mut counter: i64 = 1;
        coords.insert(
            root,
            NodeCoordinates {
                left: counter,
                right: 0,
                tree_id: root,
                depth: 0,
            },
        );
        counter += 1;

        // Stack frames hold (node, index of the next child to visit).
        let mut stack: Vec<(i64, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let (node, child_idx) = *frame;
            let next_child = children.get(&node).and_then(|c| c.get(child_idx)).copied();

            match next_child {
                Some(child) => {
                    frame.1 += 1;
                    let depth = stack.len() as i64;
                    coords.insert(
                        child,
                        NodeCoordinates {
                            left: counter,
                            right: 0,
                            tree_id: root,
                            depth,
                        },
                    );
                    counter += 1;
                    stack.push((child, 0));
                }
                None => {
                    if let Some(c) = coords.get_mut(&node) {
                        c.right = counter;
                    }
                    counter += 1;
                    stack.pop();
                }
            }
        }
    }

    // Every node must have been reached from a root; leftovers sit on a
    // cycle (or below one).
    if coords.len() != nodes.len() {
        let unreachable: Vec<i64> = ids
            .iter()
            .filter(|id| !coords.contains_key(id))
            .copied()
            .collect();
        return Err(TaxonomyError::CycleDetected(unreachable));
    }

    Ok(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, parent_id: Option<i64>) -> TaxonNode {
        TaxonNode { id, parent_id }
    }

    #[test]
    fn test_single_root_with_child() {
        // A(1) -> B(2), plus a second root C(3)
        let coords = build_forest(&[node(1, None), node(2, Some(1)), node(3, None)]).unwrap();

        let a = coords[&1];
        let b = coords[&2];
        let c = coords[&3];

        assert_eq!((a.left, a.right, a.tree_id, a.depth), (1, 4, 1, 0));
        assert_eq!((b.left, b.right, b.tree_id, b.depth), (2, 3, 1, 1));
        assert_eq!((c.left, c.right, c.tree_id, c.depth), (1, 2, 3, 0));
    }

    #[test]
    fn test_siblings_ordered_by_id() {
        let coords =
            build_forest(&[node(10, None), node(12, Some(10)), node(11, Some(10))]).unwrap();

        assert!(coords[&11].left < coords[&12].left);
        assert_eq!(coords[&10].right, 6);
    }

    #[test]
    fn test_interval_width_matches_descendant_count() {
        // root 1 with children 2,3; 3 has children 4,5
        let nodes = [
            node(1, None),
            node(2, Some(1)),
            node(3, Some(1)),
            node(4, Some(3)),
            node(5, Some(3)),
        ];
        let coords = build_forest(&nodes).unwrap();

        let descendants = |id: i64| -> i64 {
            let c = coords[&id];
            nodes
                .iter()
                .filter(|n| {
                    let d = coords[&n.id];
                    d.tree_id == c.tree_id && d.left > c.left && d.right < c.right
                })
                .count() as i64
        };

        for n in &nodes {
            let c = coords[&n.id];
            let width = c.right - c.left;
            assert_eq!(width % 2, 1, "interval width must be odd");
            assert_eq!(width, 2 * descendants(n.id) + 1);
        }
    }

    #[test]
    fn test_strict_nesting_of_descendants() {
        let nodes = [
            node(1, None),
            node(2, Some(1)),
            node(3, Some(2)),
            node(4, Some(3)),
        ];
        let coords = build_forest(&nodes).unwrap();

        for n in &nodes {
            if let Some(parent) = n.parent_id {
                let c = coords[&n.id];
                let p = coords[&parent];
                assert!(p.left < c.left && c.left < c.right && c.right < p.right);
                assert_eq!(c.tree_id, p.tree_id);
                assert_eq!(c.depth, p.depth + 1);
            }
        }
    }

    #[test]
    fn test_forest_trees_are_independent() {
        let coords = build_forest(&[
            node(1, None),
            node(2, Some(1)),
            node(7, None),
            node(8, Some(7)),
            node(9, Some(7)),
        ])
        .unwrap();

        assert_eq!(coords[&1].tree_id, 1);
        assert_eq!(coords[&2].tree_id, 1);
        assert_eq!(coords[&7].tree_id, 7);
        assert_eq!(coords[&8].tree_id, 7);
        assert_eq!(coords[&9].tree_id, 7);

        // Each tree numbers from 1 independently.
        assert_eq!(coords[&1].left, 1);
        assert_eq!(coords[&7].left, 1);
        assert_eq!(coords[&7].right, 6);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        // A 50_000-node chain would blow a recursive implementation.
        let mut nodes = vec![node(0, None)];
        for id in 1..50_000 {
            nodes.push(node(id, Some(id - 1)));
        }

        let coords = build_forest(&nodes).unwrap();
        assert_eq!(coords[&0].right, 100_000);
        assert_eq!(coords[&49_999].depth, 49_999);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let err = build_forest(&[node(1, None), node(2, Some(99))]).unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::UnknownParent { child: 2, parent: 99 }
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        // 2 and 3 point at each other; 1 is a valid root.
        let err = build_forest(&[node(1, None), node(2, Some(3)), node(3, Some(2))]).unwrap_err();
        match err {
            TaxonomyError::CycleDetected(ids) => assert_eq!(ids, vec![2, 3]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_parent_rejected() {
        let err = build_forest(&[node(1, Some(1))]).unwrap_err();
        assert!(matches!(err, TaxonomyError::CycleDetected(_)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = build_forest(&[node(1, None), node(1, None)]).unwrap_err();
        assert!(matches!(err, TaxonomyError::DuplicateTaxonId(1)));
    }

    #[test]
    fn test_empty_input() {
        let coords = build_forest(&[]).unwrap();
        assert!(coords.is_empty());
    }
}
