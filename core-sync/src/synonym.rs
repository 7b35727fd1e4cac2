//! # Synonym Mapper
//!
//! Translates provider-local taxon identifiers into canonical taxon ids
//! using the per-provider synonym key.
//!
//! ## Overview
//!
//! Every taxon carries a `synonyms` map of synonym_key -> external id. For a
//! given key the mapper inverts that map (external id -> canonical id) and
//! resolves provider identifiers against it. Unmapped identifiers resolve to
//! `None` rather than erroring: occurrences may legitimately reference taxa
//! not yet present in the reference.
//!
//! The reserved `canonical` key means the provider's identifiers already are
//! canonical ids; they pass through unmapped, filtered only against the set
//! of existing taxa so the occurrence/taxon foreign key stays satisfiable.
//!
//! When only the synonym table changes, [`SynonymMapper::update_synonym_mapping`]
//! recomputes and bulk-updates the canonical `taxon_id` column for every
//! occurrence of a provider without touching the rest of the row.

use crate::error::{Result, SyncError};
use core_store::{StoreError, IDENTITY_SYNONYM_KEY};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Outcome of resolving a batch of provider taxon identifiers.
#[derive(Debug, Clone, Default)]
pub struct TaxonResolution {
    resolved: HashMap<String, i64>,
    /// Provider identifiers with no canonical match, in input order
    pub unmatched: Vec<String>,
}

impl TaxonResolution {
    /// Canonical taxon id for a provider identifier, if it mapped.
    pub fn get(&self, provider_taxon_id: &str) -> Option<i64> {
        self.resolved.get(provider_taxon_id).copied()
    }

    pub fn matched_count(&self) -> usize {
        self.resolved.len()
    }
}

/// Outcome of a retroactive remap.
#[derive(Debug, Clone, Default)]
pub struct RemapReport {
    /// Occurrences whose taxon_id changed
    pub occurrences_updated: u64,
    /// Provider identifiers that found no canonical match
    pub unmatched: Vec<String>,
}

/// Maps provider taxon identifier spaces onto the canonical taxonomy.
pub struct SynonymMapper {
    pool: SqlitePool,
}

impl SynonymMapper {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve provider taxon identifiers under the given synonym key, on an
    /// existing connection (typically the sync transaction).
    pub async fn resolve_with(
        conn: &mut SqliteConnection,
        synonym_key: &str,
        provider_taxon_ids: &[String],
    ) -> Result<TaxonResolution> {
        let mut resolution = TaxonResolution::default();
        if provider_taxon_ids.is_empty() {
            return Ok(resolution);
        }

        if synonym_key == IDENTITY_SYNONYM_KEY {
            // Identity mapping: ids pass through, filtered against existing
            // taxa so unknown references resolve to null.
            let existing: HashSet<i64> = sqlx::query_as::<_, (i64,)>("SELECT id FROM taxon")
                .fetch_all(&mut *conn)
                .await?
                .into_iter()
                .map(|(id,)| id)
                .collect();

            for provider_id in provider_taxon_ids {
                match provider_id.parse::<i64>() {
                    Ok(id) if existing.contains(&id) => {
                        resolution.resolved.insert(provider_id.clone(), id);
                    }
                    _ => resolution.unmatched.push(provider_id.clone()),
                }
            }
        } else {
            // Invert taxon.synonyms[key]: external id -> canonical id.
            let json_path = format!("$.{}", synonym_key);
            let rows: Vec<(i64, String)> = sqlx::query_as(
                r#"
                SELECT id, CAST(json_extract(synonyms, ?) AS TEXT)
                FROM taxon
                WHERE json_extract(synonyms, ?) IS NOT NULL
                "#,
            )
            .bind(&json_path)
            .bind(&json_path)
            .fetch_all(&mut *conn)
            .await?;

            let inverse: HashMap<String, i64> =
                rows.into_iter().map(|(id, ext)| (ext, id)).collect();

            for provider_id in provider_taxon_ids {
                match inverse.get(provider_id) {
                    Some(&id) => {
                        resolution.resolved.insert(provider_id.clone(), id);
                    }
                    None => resolution.unmatched.push(provider_id.clone()),
                }
            }
        }

        if !resolution.unmatched.is_empty() {
            warn!(
                synonym_key = %synonym_key,
                unmatched = resolution.unmatched.len(),
                "Provider taxon identifiers without canonical match resolve to null"
            );
        }

        debug!(
            synonym_key = %synonym_key,
            matched = resolution.matched_count(),
            unmatched = resolution.unmatched.len(),
            "Resolved provider taxon identifiers"
        );

        Ok(resolution)
    }

    /// Recompute the canonical taxon reference of every occurrence of a
    /// provider, after the synonym table changed.
    ///
    /// Only the `taxon_id` column is written, and only for occurrences whose
    /// resolution actually changed.
    #[instrument(skip(self))]
    pub async fn update_synonym_mapping(&self, provider_name: &str) -> Result<RemapReport> {
        let provider: (i64, Option<i64>) = sqlx::query_as(
            "SELECT id, synonym_key_id FROM data_provider WHERE name = ?",
        )
        .bind(provider_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SyncError::Store(StoreError::not_found("data_provider", provider_name)))?;
        let (provider_id, synonym_key_id) = provider;

        let synonym_key = match synonym_key_id {
            Some(id) => {
                sqlx::query_as::<_, (String,)>("SELECT name FROM synonym_key_registry WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|(name,)| name)
                    .ok_or_else(|| SyncError::Store(StoreError::not_found("synonym_key", id)))?
            }
            None => IDENTITY_SYNONYM_KEY.to_string(),
        };

        let mut tx = self.pool.begin().await?;

        let occurrences: Vec<(i64, Option<String>, Option<i64>)> = sqlx::query_as(
            "SELECT id, provider_taxon_id, taxon_id FROM occurrence WHERE provider_id = ?",
        )
        .bind(provider_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut provider_taxon_ids: Vec<String> = occurrences
            .iter()
            .filter_map(|(_, provider_taxon_id, _)| provider_taxon_id.clone())
            .collect();
        provider_taxon_ids.sort_unstable();
        provider_taxon_ids.dedup();

        let resolution =
            Self::resolve_with(&mut *tx, &synonym_key, &provider_taxon_ids).await?;

        let mut updated = 0u64;
        for (id, provider_taxon_id, current_taxon_id) in &occurrences {
            let new_taxon_id = provider_taxon_id
                .as_deref()
                .and_then(|ext| resolution.get(ext));
            if new_taxon_id != *current_taxon_id {
                sqlx::query("UPDATE occurrence SET taxon_id = ? WHERE id = ?")
                    .bind(new_taxon_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                updated += 1;
            }
        }

        tx.commit().await?;

        info!(
            provider = %provider_name,
            synonym_key = %synonym_key,
            occurrences_updated = updated,
            "Retroactive synonym remap complete"
        );

        Ok(RemapReport {
            occurrences_updated: updated,
            unmatched: resolution.unmatched,
        })
    }
}
