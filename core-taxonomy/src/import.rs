//! # Taxonomy Replacement Transaction
//!
//! Atomically replaces the taxonomic reference and reconciles the set of
//! registered synonym keys.
//!
//! ## Overview
//!
//! Taxonomic references change rarely and wholesale compared to occurrence
//! data, so replacement is full-replace by design: no incremental taxonomy
//! diffing. The import accepts a tabular input with the required columns
//! {parent_id, rank, full_name, rank_name}; every extra column becomes a
//! synonym key whose per-taxon values land in the `synonyms` JSON map and
//! whose uniqueness is enforced by a dynamically managed partial index.
//!
//! ## Transaction sequence
//!
//! 1. drop removed synonym-key indexes and registry rows
//! 2. delete all existing taxon rows
//! 3. register newly-added keys and create their unique indexes
//! 4. bulk insert the new rows with MPTT coordinates
//!
//! Step ordering guarantees a per-key unique index never coexists with the
//! old rows it was not built for. Kept keys are never touched, so their
//! registry ids survive the reload.

use crate::error::{Result, TaxonomyError};
use crate::mptt::{build_forest, TaxonNode};
use core_store::{PropertyMap, TaxonRank, IDENTITY_SYNONYM_KEY};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Columns every taxonomy input must carry.
pub const REQUIRED_COLUMNS: &[&str] = &["parent_id", "rank", "full_name", "rank_name"];

/// One input row: the taxon id plus its column values.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyRecord {
    pub id: i64,
    pub values: BTreeMap<String, Value>,
}

/// Tabular taxonomy input.
///
/// `columns` is the declared column set (synonym keys are detected from it,
/// so a column present in the header counts even when every value is null).
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyTable {
    pub columns: Vec<String>,
    pub records: Vec<TaxonomyRecord>,
}

impl TaxonomyTable {
    /// Load a taxonomy table from a CSV file.
    ///
    /// The header must contain an `id` column plus the required taxonomic
    /// columns; empty cells become nulls.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())
            .map_err(|e| TaxonomyError::MalformedInput(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| TaxonomyError::MalformedInput(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if !headers.iter().any(|h| h == "id") {
            return Err(TaxonomyError::MissingColumns(vec!["id".to_string()]));
        }

        let columns: Vec<String> = headers.iter().filter(|h| *h != "id").cloned().collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| TaxonomyError::MalformedInput(e.to_string()))?;

            let mut id = None;
            let mut values = BTreeMap::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                let cell = cell.trim();
                if header == "id" {
                    id = Some(cell.parse::<i64>().map_err(|_| {
                        TaxonomyError::MalformedInput(format!("unparsable taxon id '{}'", cell))
                    })?);
                } else if !cell.is_empty() {
                    values.insert(header.clone(), Value::String(cell.to_string()));
                }
            }

            let id = id.ok_or_else(|| {
                TaxonomyError::MalformedInput("row without an id value".to_string())
            })?;
            records.push(TaxonomyRecord { id, values });
        }

        Ok(Self { columns, records })
    }

    fn validate_columns(&self) -> Result<()> {
        let present: BTreeSet<&str> = self.columns.iter().map(|c| c.as_str()).collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !present.contains(**c))
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TaxonomyError::MissingColumns(missing))
        }
    }

    /// Extra columns, i.e. candidate synonym keys, in declaration order.
    fn extra_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !REQUIRED_COLUMNS.contains(&c.as_str()) && c.as_str() != "id")
            .cloned()
            .collect()
    }
}

/// Outcome of a taxonomy replacement.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyImportReport {
    /// Number of taxon rows inserted
    pub inserted: usize,
    /// Synonym keys detected in the input (registry state after the import)
    pub synonym_keys: Vec<String>,
    /// Keys newly registered by this import
    pub keys_added: Vec<String>,
    /// Keys unregistered by this import
    pub keys_removed: Vec<String>,
    /// Canonical occurrence taxon references nulled because their taxon is
    /// absent from the new reference
    pub dangling_occurrence_refs: u64,
    /// Non-fatal anomalies
    pub warnings: Vec<String>,
}

/// Replaces the taxonomy table and manages the synonym key registry.
pub struct TaxonomyImporter {
    pool: SqlitePool,
}

struct ParsedTaxon {
    id: i64,
    full_name: String,
    rank_name: String,
    rank: TaxonRank,
    parent_id: Option<i64>,
    synonyms: PropertyMap,
}

impl TaxonomyImporter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the whole taxonomic reference with the given input.
    ///
    /// Validates the input, computes MPTT coordinates, reconciles the synonym
    /// key registry against the input's extra columns and performs the
    /// replacement in one transaction. See the module docs for the exact
    /// sequence.
    ///
    /// # Errors
    ///
    /// Rejects input missing required columns, rows with unknown ranks or
    /// unparsable parent references, and any hierarchy the MPTT builder
    /// refuses (unknown parents, duplicate ids, cycles). On error nothing is
    /// written.
    #[instrument(skip(self, table), fields(rows = table.records.len()))]
    pub async fn set_taxonomy(&self, table: &TaxonomyTable) -> Result<TaxonomyImportReport> {
        table.validate_columns()?;

        let mut report = TaxonomyImportReport::default();

        // Detect synonym keys from the extra columns; the reserved identity
        // key cannot be supplied from outside.
        let mut synonym_keys = Vec::new();
        for column in table.extra_columns() {
            if column == IDENTITY_SYNONYM_KEY {
                let message = format!(
                    "ignoring input column '{}': reserved identity synonym key",
                    IDENTITY_SYNONYM_KEY
                );
                warn!("{}", message);
                report.warnings.push(message);
                continue;
            }
            validate_synonym_key_name(&column)?;
            synonym_keys.push(column);
        }

        let parsed = parse_records(table, &synonym_keys)?;

        let nodes: Vec<TaxonNode> = parsed
            .iter()
            .map(|t| TaxonNode {
                id: t.id,
                parent_id: t.parent_id,
            })
            .collect();
        let coords = build_forest(&nodes)?;

        // Symmetric difference against the registry: add / keep / remove.
        let current: BTreeSet<String> =
            sqlx::query_as::<_, (String,)>("SELECT name FROM synonym_key_registry WHERE name != ?")
                .bind(IDENTITY_SYNONYM_KEY)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|(name,)| name)
                .collect();
        let incoming: BTreeSet<String> = synonym_keys.iter().cloned().collect();

        let to_add: Vec<String> = incoming.difference(&current).cloned().collect();
        let to_remove: Vec<String> = current.difference(&incoming).cloned().collect();

        for key in &to_remove {
            let dependents: Vec<(String,)> = sqlx::query_as(
                r#"
                SELECT dp.name FROM data_provider dp
                JOIN synonym_key_registry sk ON dp.synonym_key_id = sk.id
                WHERE sk.name = ?
                ORDER BY dp.name
                "#,
            )
            .bind(key)
            .fetch_all(&self.pool)
            .await?;

            if !dependents.is_empty() {
                let names: Vec<String> = dependents.into_iter().map(|(n,)| n).collect();
                let message = format!(
                    "removing synonym key '{}' still used by provider(s): {}",
                    key,
                    names.join(", ")
                );
                warn!("{}", message);
                report.warnings.push(message);
            }
        }

        let mut tx = self.pool.begin().await?;

        for key in &to_remove {
            sqlx::query(&format!("DROP INDEX IF EXISTS {}", synonym_index_name(key)))
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM synonym_key_registry WHERE name = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM taxon").execute(&mut *tx).await?;

        for key in &to_add {
            sqlx::query("INSERT INTO synonym_key_registry (name) VALUES (?)")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            sqlx::query(&format!(
                r#"
                CREATE UNIQUE INDEX {index} ON taxon (json_extract(synonyms, '$.{key}'))
                WHERE json_extract(synonyms, '$.{key}') IS NOT NULL
                "#,
                index = synonym_index_name(key),
                key = key,
            ))
            .execute(&mut *tx)
            .await?;
        }

        for taxon in &parsed {
            let c = coords[&taxon.id];
            sqlx::query(
                r#"
                INSERT INTO taxon (
                    id, full_name, rank_name, rank, parent_id, synonyms,
                    mptt_left, mptt_right, mptt_tree_id, mptt_depth
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(taxon.id)
            .bind(&taxon.full_name)
            .bind(&taxon.rank_name)
            .bind(taxon.rank)
            .bind(taxon.parent_id)
            .bind(Json(&taxon.synonyms))
            .bind(c.left)
            .bind(c.right)
            .bind(c.tree_id)
            .bind(c.depth)
            .execute(&mut *tx)
            .await?;
        }

        // Occurrences pointing at taxa absent from the new reference lose
        // their classification instead of failing the deferred FK at commit.
        let dangling = sqlx::query(
            r#"
            UPDATE occurrence SET taxon_id = NULL
            WHERE taxon_id IS NOT NULL
              AND taxon_id NOT IN (SELECT id FROM taxon)
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if dangling > 0 {
            let message = format!(
                "{} occurrence(s) referenced taxa absent from the new taxonomy; their taxon_id was cleared",
                dangling
            );
            warn!("{}", message);
            report.warnings.push(message);
        }

        report.inserted = parsed.len();
        report.synonym_keys = synonym_keys;
        report.keys_added = to_add;
        report.keys_removed = to_remove;
        report.dangling_occurrence_refs = dangling;

        info!(
            inserted = report.inserted,
            keys_added = report.keys_added.len(),
            keys_removed = report.keys_removed.len(),
            "Taxonomy replaced"
        );

        Ok(report)
    }
}

fn parse_records(table: &TaxonomyTable, synonym_keys: &[String]) -> Result<Vec<ParsedTaxon>> {
    let mut parsed = Vec::with_capacity(table.records.len());

    for record in &table.records {
        let full_name = string_value(record, "full_name")?.ok_or_else(|| {
            TaxonomyError::MalformedInput(format!("taxon {} has no full_name", record.id))
        })?;
        let rank_name = string_value(record, "rank_name")?.unwrap_or_default();
        let rank: TaxonRank = string_value(record, "rank")?
            .ok_or_else(|| {
                TaxonomyError::MalformedInput(format!("taxon {} has no rank", record.id))
            })?
            .parse()?;
        let parent_id = integer_value(record, "parent_id")?;

        let mut synonyms = PropertyMap::new();
        for key in synonym_keys {
            if let Some(value) = record.values.get(key) {
                if !value.is_null() {
                    synonyms.insert(key.clone(), value.clone());
                }
            }
        }

        parsed.push(ParsedTaxon {
            id: record.id,
            full_name,
            rank_name,
            rank,
            parent_id,
            synonyms,
        });
    }

    Ok(parsed)
}

fn string_value(record: &TaxonomyRecord, column: &str) -> Result<Option<String>> {
    match record.values.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Ok(Some(other.to_string())),
    }
}

fn integer_value(record: &TaxonomyRecord, column: &str) -> Result<Option<i64>> {
    match record.values.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| {
            TaxonomyError::MalformedInput(format!(
                "taxon {}: non-integer {} '{}'",
                record.id, column, n
            ))
        }),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| {
            TaxonomyError::MalformedInput(format!(
                "taxon {}: unparsable {} '{}'",
                record.id, column, s
            ))
        }),
        Some(other) => Err(TaxonomyError::MalformedInput(format!(
            "taxon {}: unparsable {} '{}'",
            record.id, column, other
        ))),
    }
}

/// Synonym key names end up in index identifiers and JSON paths; restrict
/// them to a safe character set.
fn validate_synonym_key_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TaxonomyError::InvalidSynonymKey(name.to_string()))
    }
}

fn synonym_index_name(key: &str) -> String {
    format!("idx_taxon_synonym_{}", key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_store::db::create_test_pool;
    use core_store::repositories::{
        NewDataProvider, ProviderRepository, SqliteProviderRepository, SqliteSynonymKeyRepository,
        SqliteTaxonRepository, SynonymKeyRepository, TaxonRepository,
    };
    use serde_json::json;

    fn record(id: i64, values: Vec<(&str, Value)>) -> TaxonomyRecord {
        TaxonomyRecord {
            id,
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn columns(extra: &[&str]) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(extra.iter().map(|c| c.to_string()))
            .collect()
    }

    fn sample_table(extra: &[&str]) -> TaxonomyTable {
        let mut records = vec![
            record(
                1,
                vec![
                    ("full_name", json!("Plantae")),
                    ("rank", json!("REGNUM")),
                    ("rank_name", json!("Kingdom")),
                ],
            ),
            record(
                2,
                vec![
                    ("full_name", json!("Myrtaceae")),
                    ("rank", json!("FAMILIA")),
                    ("rank_name", json!("Family")),
                    ("parent_id", json!(1)),
                ],
            ),
            record(
                3,
                vec![
                    ("full_name", json!("Syzygium")),
                    ("rank", json!("GENUS")),
                    ("rank_name", json!("Genus")),
                    ("parent_id", json!(2)),
                ],
            ),
        ];

        for r in &mut records {
            for key in extra {
                r.values
                    .insert(key.to_string(), json!(format!("{}-{}", key, r.id)));
            }
        }

        TaxonomyTable {
            columns: columns(extra),
            records,
        }
    }

    #[tokio::test]
    async fn test_missing_required_columns_rejected() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool);

        let table = TaxonomyTable {
            columns: vec!["full_name".to_string(), "rank".to_string()],
            records: vec![],
        };

        let err = importer.set_taxonomy(&table).await.unwrap_err();
        match err {
            TaxonomyError::MissingColumns(missing) => {
                assert_eq!(missing, vec!["parent_id", "rank_name"]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_basic_replacement_assigns_mptt_coordinates() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool.clone());
        let taxa = SqliteTaxonRepository::new(pool);

        let report = importer.set_taxonomy(&sample_table(&[])).await.unwrap();
        assert_eq!(report.inserted, 3);
        assert!(report.synonym_keys.is_empty());

        let root = taxa.find_by_id(1).await.unwrap().unwrap();
        assert_eq!((root.mptt_left, root.mptt_right), (1, 6));
        assert_eq!(root.mptt_tree_id, 1);
        assert!(root.validate().is_ok());

        let genus = taxa.find_by_id(3).await.unwrap().unwrap();
        assert_eq!((genus.mptt_left, genus.mptt_right), (3, 4));
        assert_eq!(genus.mptt_depth, 2);

        let descendants = taxa.list_descendants(1).await.unwrap();
        assert_eq!(descendants.len(), 2);
        assert_eq!(descendants[0].id, 2);

        let roots = taxa.list_roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].descendant_count(), 2);

        let children = taxa.list_children(2).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].full_name, "Syzygium");

        let by_name = taxa.find_by_full_name("Myrtaceae").await.unwrap().unwrap();
        assert_eq!(by_name.id, 2);
        assert!(!by_name.is_root());
    }

    #[tokio::test]
    async fn test_synonym_keys_detected_and_registered() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool.clone());
        let keys = SqliteSynonymKeyRepository::new(pool.clone());

        let report = importer
            .set_taxonomy(&sample_table(&["gbif", "taxref"]))
            .await
            .unwrap();
        assert_eq!(report.synonym_keys, vec!["gbif", "taxref"]);
        assert_eq!(report.keys_added, vec!["gbif", "taxref"]);

        assert!(keys.find_by_name("gbif").await.unwrap().is_some());
        assert!(keys.find_by_name("taxref").await.unwrap().is_some());

        // The per-key unique index exists.
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_taxon_synonym_gbif'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_rerun_preserves_kept_key_ids() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool.clone());
        let keys = SqliteSynonymKeyRepository::new(pool);

        importer
            .set_taxonomy(&sample_table(&["gbif"]))
            .await
            .unwrap();
        let before = keys.find_by_name("gbif").await.unwrap().unwrap();

        let report = importer
            .set_taxonomy(&sample_table(&["gbif"]))
            .await
            .unwrap();
        assert!(report.keys_added.is_empty());
        assert!(report.keys_removed.is_empty());

        let after = keys.find_by_name("gbif").await.unwrap().unwrap();
        assert_eq!(before.id, after.id);
    }

    #[tokio::test]
    async fn test_removed_key_warns_about_dependent_providers() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool.clone());
        let providers = SqliteProviderRepository::new(pool.clone());
        let keys = SqliteSynonymKeyRepository::new(pool);

        importer
            .set_taxonomy(&sample_table(&["gbif"]))
            .await
            .unwrap();
        providers
            .register(NewDataProvider {
                name: "gbif-export".to_string(),
                provider_type: "csv".to_string(),
                synonym_key: Some("gbif".to_string()),
                properties: PropertyMap::new(),
            })
            .await
            .unwrap();

        let report = importer.set_taxonomy(&sample_table(&[])).await.unwrap();
        assert_eq!(report.keys_removed, vec!["gbif"]);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("gbif") && w.contains("gbif-export")));
        assert!(keys.find_by_name("gbif").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reserved_column_ignored_with_warning() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool.clone());
        let taxa = SqliteTaxonRepository::new(pool);

        let report = importer
            .set_taxonomy(&sample_table(&["canonical"]))
            .await
            .unwrap();
        assert!(report.synonym_keys.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("reserved")));

        // The reserved column never lands in the synonyms map.
        let taxon = taxa.find_by_id(1).await.unwrap().unwrap();
        assert!(taxon.synonyms.0.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_synonym_key_name_rejected() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool);

        let mut table = sample_table(&[]);
        table.columns.push("bad key; drop".to_string());

        let err = importer.set_taxonomy(&table).await.unwrap_err();
        assert!(matches!(err, TaxonomyError::InvalidSynonymKey(_)));
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_write() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool.clone());
        let taxa = SqliteTaxonRepository::new(pool);

        importer.set_taxonomy(&sample_table(&[])).await.unwrap();

        let mut bad = sample_table(&[]);
        bad.records[0]
            .values
            .insert("parent_id".to_string(), json!(3));

        let err = importer.set_taxonomy(&bad).await.unwrap_err();
        assert!(matches!(err, TaxonomyError::CycleDetected(_)));

        // The previous taxonomy is untouched.
        assert_eq!(taxa.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_rank_rejected() {
        let pool = create_test_pool().await.unwrap();
        let importer = TaxonomyImporter::new(pool);

        let mut bad = sample_table(&[]);
        bad.records[0]
            .values
            .insert("rank".to_string(), json!("TRIBE"));

        let err = importer.set_taxonomy(&bad).await.unwrap_err();
        assert!(matches!(err, TaxonomyError::Store(_)));
    }
}
