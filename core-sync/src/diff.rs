//! # Diff / Reconciliation Engine
//!
//! Computes the minimal insert/update/delete sets needed to bring a canonical
//! snapshot into agreement with a provider snapshot.
//!
//! ## Overview
//!
//! The engine is pure: it performs no I/O and is reused unmodified for
//! occurrences, plots and (with a composite two-part key) plot/occurrence
//! associations. Rows are matched by their provider-local key:
//!
//! - **insert**: keys present only in the provider snapshot
//! - **delete**: keys present only in the canonical snapshot; the returned
//!   rows are the canonical ones, so canonical ids are recovered by
//!   re-indexing the canonical snapshot by provider-local key
//! - **update**: keys present in both where at least one tracked field
//!   differs; returned as (current, incoming) pairs so the caller keeps the
//!   canonical identity while applying the incoming fields
//!
//! Field comparison is delegated to [`Reconcilable::content_matches`].
//! Implementations compare nullable fields with `Option` equality (two nulls
//! are equal, a null differs from any non-null) and property maps as sorted
//! `BTreeMap`s with deep value equality, so insertion order never produces a
//! false update.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A snapshot row that can be reconciled against another snapshot of the
/// same entity.
pub trait Reconcilable {
    /// Provider-local key identifying the row within its provider.
    type Key: Ord + Eq + Hash + Clone + fmt::Debug;

    fn provider_key(&self) -> Self::Key;

    /// Whether the tracked fields of `incoming` match this row's.
    fn content_matches(&self, incoming: &Self) -> bool;
}

/// A matched pair scheduled for update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePair<R> {
    /// The canonical row (carries the canonical id)
    pub current: R,
    /// The provider row (carries the new field values)
    pub incoming: R,
}

/// Result of diffing one entity collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffSet<R> {
    pub insert: Vec<R>,
    pub update: Vec<UpdatePair<R>>,
    pub delete: Vec<R>,
}

impl<R> DiffSet<R> {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// (inserted, updated, deleted) counts.
    pub fn counts(&self) -> (u64, u64, u64) {
        (
            self.insert.len() as u64,
            self.update.len() as u64,
            self.delete.len() as u64,
        )
    }
}

/// Diff a canonical snapshot against a provider snapshot.
///
/// The three returned sets are pairwise disjoint by key and cover exactly the
/// symmetric difference plus the changed intersection. Output order is
/// deterministic (ascending by key). An empty provider snapshot deletes the
/// whole canonical snapshot.
pub fn diff<R>(canonical: &[R], incoming: &[R]) -> DiffSet<R>
where
    R: Reconcilable + Clone,
{
    // Re-index the canonical snapshot by provider-local key.
    let canonical_index: HashMap<R::Key, &R> = canonical
        .iter()
        .map(|row| (row.provider_key(), row))
        .collect();
    let incoming_keys: HashSet<R::Key> =
        incoming.iter().map(|row| row.provider_key()).collect();

    let mut insert = Vec::new();
    let mut update = Vec::new();
    for row in incoming {
        match canonical_index.get(&row.provider_key()) {
            None => insert.push(row.clone()),
            Some(current) => {
                if !current.content_matches(row) {
                    update.push(UpdatePair {
                        current: (*current).clone(),
                        incoming: row.clone(),
                    });
                }
            }
        }
    }

    let mut delete: Vec<R> = canonical
        .iter()
        .filter(|row| !incoming_keys.contains(&row.provider_key()))
        .cloned()
        .collect();

    insert.sort_by_key(|row| row.provider_key());
    update.sort_by_key(|pair| pair.incoming.provider_key());
    delete.sort_by_key(|row| row.provider_key());

    DiffSet {
        insert,
        update,
        delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use source_traits::PropertyMap;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        pk: i64,
        id: Option<i64>,
        label: Option<String>,
        properties: PropertyMap,
    }

    impl Row {
        fn new(pk: i64, id: Option<i64>, label: Option<&str>) -> Self {
            Self {
                pk,
                id,
                label: label.map(|s| s.to_string()),
                properties: PropertyMap::new(),
            }
        }
    }

    impl Reconcilable for Row {
        type Key = i64;

        fn provider_key(&self) -> i64 {
            self.pk
        }

        fn content_matches(&self, incoming: &Self) -> bool {
            self.label == incoming.label && self.properties == incoming.properties
        }
    }

    #[test]
    fn test_reported_scenario() {
        // Canonical has pks {0, 1, 2, 5}; provider now reports {1, 2, 3}.
        let canonical = vec![
            Row::new(0, Some(10), Some("a")),
            Row::new(1, Some(11), Some("b")),
            Row::new(2, Some(12), Some("c")),
            Row::new(5, Some(15), Some("d")),
        ];
        let incoming = vec![
            Row::new(1, None, Some("b")),
            Row::new(2, None, Some("c")),
            Row::new(3, None, Some("e")),
        ];

        let result = diff(&canonical, &incoming);

        let deleted: Vec<i64> = result.delete.iter().map(|r| r.pk).collect();
        let inserted: Vec<i64> = result.insert.iter().map(|r| r.pk).collect();
        assert_eq!(deleted, vec![0, 5]);
        assert_eq!(inserted, vec![3]);
        assert!(result.update.is_empty());

        // Deleted rows carry the canonical ids recovered from the canonical
        // snapshot.
        assert_eq!(result.delete[0].id, Some(10));
        assert_eq!(result.delete[1].id, Some(15));
    }

    #[test]
    fn test_update_detected_on_field_change() {
        let canonical = vec![Row::new(1, Some(11), Some("old"))];
        let incoming = vec![Row::new(1, None, Some("new"))];

        let result = diff(&canonical, &incoming);
        assert_eq!(result.update.len(), 1);
        assert_eq!(result.update[0].current.id, Some(11));
        assert_eq!(result.update[0].incoming.label.as_deref(), Some("new"));
        assert!(result.insert.is_empty());
        assert!(result.delete.is_empty());
    }

    #[test]
    fn test_null_fields_compare_equal() {
        let canonical = vec![Row::new(1, Some(11), None)];
        let incoming = vec![Row::new(1, None, None)];

        assert!(diff(&canonical, &incoming).is_empty());
    }

    #[test]
    fn test_null_differs_from_non_null() {
        let canonical = vec![Row::new(1, Some(11), None)];
        let incoming = vec![Row::new(1, None, Some("x"))];

        assert_eq!(diff(&canonical, &incoming).update.len(), 1);
    }

    #[test]
    fn test_property_insertion_order_is_not_a_change() {
        let mut canonical_row = Row::new(1, Some(11), None);
        canonical_row
            .properties
            .insert("height".to_string(), serde_json::json!(12));
        canonical_row
            .properties
            .insert("dbh".to_string(), serde_json::json!(30));

        let mut incoming_row = Row::new(1, None, None);
        incoming_row
            .properties
            .insert("dbh".to_string(), serde_json::json!(30));
        incoming_row
            .properties
            .insert("height".to_string(), serde_json::json!(12));

        assert!(diff(&[canonical_row], &[incoming_row]).is_empty());
    }

    #[test]
    fn test_nested_properties_compare_deeply() {
        let mut canonical_row = Row::new(1, Some(11), None);
        canonical_row.properties.insert(
            "strata".to_string(),
            serde_json::json!({"upper": 3, "lower": 1}),
        );

        let mut same = canonical_row.clone();
        same.id = None;
        let mut changed = same.clone();
        changed.properties.insert(
            "strata".to_string(),
            serde_json::json!({"upper": 4, "lower": 1}),
        );

        assert!(diff(&[canonical_row.clone()], &[same]).is_empty());
        assert_eq!(diff(&[canonical_row], &[changed]).update.len(), 1);
    }

    #[test]
    fn test_empty_provider_snapshot_deletes_everything() {
        let canonical = vec![
            Row::new(1, Some(11), Some("a")),
            Row::new(2, Some(12), Some("b")),
        ];

        let result = diff(&canonical, &[]);
        assert_eq!(result.delete.len(), 2);
        assert!(result.insert.is_empty());
        assert!(result.update.is_empty());
    }

    #[test]
    fn test_both_snapshots_empty() {
        let result = diff::<Row>(&[], &[]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_partition_properties() {
        // insert ∪ update ∪ unaffected == incoming, and
        // delete ∪ update ∪ unaffected == canonical, all disjoint by key.
        let canonical = vec![
            Row::new(1, Some(11), Some("same")),
            Row::new(2, Some(12), Some("old")),
            Row::new(3, Some(13), Some("gone")),
        ];
        let incoming = vec![
            Row::new(1, None, Some("same")),
            Row::new(2, None, Some("new")),
            Row::new(4, None, Some("fresh")),
        ];

        let result = diff(&canonical, &incoming);

        let insert_keys: BTreeSet<i64> = result.insert.iter().map(|r| r.pk).collect();
        let update_keys: BTreeSet<i64> =
            result.update.iter().map(|p| p.incoming.pk).collect();
        let delete_keys: BTreeSet<i64> = result.delete.iter().map(|r| r.pk).collect();

        assert!(insert_keys.is_disjoint(&update_keys));
        assert!(insert_keys.is_disjoint(&delete_keys));
        assert!(update_keys.is_disjoint(&delete_keys));

        let incoming_keys: BTreeSet<i64> = incoming.iter().map(|r| r.pk).collect();
        let canonical_keys: BTreeSet<i64> = canonical.iter().map(|r| r.pk).collect();
        let unaffected: BTreeSet<i64> = canonical_keys
            .intersection(&incoming_keys)
            .filter(|k| !update_keys.contains(k))
            .copied()
            .collect();

        let covered_incoming: BTreeSet<i64> = insert_keys
            .union(&update_keys)
            .chain(unaffected.iter())
            .copied()
            .collect();
        assert_eq!(covered_incoming, incoming_keys);

        let covered_canonical: BTreeSet<i64> = delete_keys
            .union(&update_keys)
            .chain(unaffected.iter())
            .copied()
            .collect();
        assert_eq!(covered_canonical, canonical_keys);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct PairRow {
        plot_pk: i64,
        occurrence_pk: i64,
        identifier: Option<String>,
    }

    impl Reconcilable for PairRow {
        type Key = (i64, i64);

        fn provider_key(&self) -> (i64, i64) {
            (self.plot_pk, self.occurrence_pk)
        }

        fn content_matches(&self, incoming: &Self) -> bool {
            self.identifier == incoming.identifier
        }
    }

    #[test]
    fn test_composite_key_diff() {
        let canonical = vec![PairRow {
            plot_pk: 1,
            occurrence_pk: 7,
            identifier: Some("T-1".to_string()),
        }];
        let incoming = vec![
            PairRow {
                plot_pk: 1,
                occurrence_pk: 7,
                identifier: Some("T-1".to_string()),
            },
            PairRow {
                plot_pk: 1,
                occurrence_pk: 8,
                identifier: Some("T-2".to_string()),
            },
        ];

        let result = diff(&canonical, &incoming);
        assert_eq!(result.insert.len(), 1);
        assert_eq!(result.insert[0].provider_key(), (1, 8));
        assert!(result.update.is_empty());
        assert!(result.delete.is_empty());
    }
}
