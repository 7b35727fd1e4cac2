//! # Entity Sync Orchestrator
//!
//! Applies provider snapshots to the canonical store in dependency order,
//! inside one transaction.
//!
//! ## Workflow
//!
//! 1. Resolve the provider registration and build its source adapter
//! 2. Fetch all three provider snapshots — adapter errors abort before any
//!    write occurs
//! 3. Open one transaction for the whole multi-entity run
//! 4. Occurrence phase: synonym-map taxon ids, diff against the canonical
//!    snapshot, apply deletes, updates, inserts
//! 5. Plot phase: same discipline
//! 6. Plot/occurrence phase: re-index provider-local (plot, occurrence)
//!    pairs against the just-synced canonical tables, sanitize duplicate and
//!    null identifiers, diff and apply
//! 7. Stamp the provider's last-sync timestamp and commit
//!
//! Occurrence and plot sync complete (even when disabled by configuration)
//! before plot/occurrence sync begins, because association rows reference
//! canonical ids assigned in the earlier phases. A provider-local plot or
//! occurrence reference with no canonical match is a fatal
//! [`SyncError::IncoherentDatabaseState`]: the whole transaction rolls back
//! and nothing is observable.
//!
//! ## Constraint deferral
//!
//! The (plot_id, occurrence_identifier) uniqueness must hold only at commit:
//! one run both deletes and inserts rows that may transiently collide on the
//! pair. SQLite cannot defer a unique index, so the apply order simulates
//! deferral — deletes first, then the identifiers of rows about to be
//! updated are staged to null, then updates, then inserts. No coexistence
//! window can trip the index.

use crate::diff::{diff, DiffSet};
use crate::error::{Result, SyncError};
use crate::registry::SourceRegistry;
use crate::report::{EntityDelta, SyncReport};
use crate::run::{SyncRun, SyncState};
use crate::snapshot::{self, OccurrenceRow, PlotOccurrenceRow, PlotRow};
use crate::synonym::SynonymMapper;
use chrono::Utc;
use core_store::{DataProvider, StoreError, IDENTITY_SYNONYM_KEY};
use source_traits::{OccurrenceRecord, PlotOccurrenceRecord, PlotRecord};
use sqlx::types::Json;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Per-run configuration: which entity phases actually pull data.
///
/// A disabled phase writes nothing but still completes in order, so the
/// state machine and the canonical-id dependency chain stay intact.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub sync_occurrences: bool,
    pub sync_plots: bool,
    pub sync_plot_occurrences: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_occurrences: true,
            sync_plots: true,
            sync_plot_occurrences: true,
        }
    }
}

/// Orchestrates multi-entity provider syncs against the canonical store.
pub struct SyncOrchestrator {
    pool: SqlitePool,
    registry: SourceRegistry,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(pool: SqlitePool, registry: SourceRegistry) -> Self {
        Self::with_config(pool, registry, SyncConfig::default())
    }

    pub fn with_config(pool: SqlitePool, registry: SourceRegistry, config: SyncConfig) -> Self {
        Self {
            pool,
            registry,
            config,
        }
    }

    /// Synchronize one provider and return the sync report.
    ///
    /// # Errors
    ///
    /// - `Store(NoRecordFound)` if the provider is not registered
    /// - `UnknownProviderType` if no adapter factory matches its type tag
    /// - `Source(MalformedSource)` from the adapter, before any write
    /// - `IncoherentDatabaseState` if an association references a plot or
    ///   occurrence that was never synced; the transaction rolls back
    #[instrument(skip(self), fields(provider = %provider_name))]
    pub async fn sync_provider(&self, provider_name: &str) -> Result<SyncReport> {
        let started = Instant::now();

        let provider = sqlx::query_as::<_, DataProvider>(
            "SELECT * FROM data_provider WHERE name = ?",
        )
        .bind(provider_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SyncError::Store(StoreError::not_found("data_provider", provider_name)))?;

        let source = self.registry.build(&provider)?;

        // Fetch every snapshot before opening the transaction: malformed
        // input aborts the sync for this provider with no write at all.
        let occurrence_records = if self.config.sync_occurrences {
            source.fetch_occurrences().await?
        } else {
            Vec::new()
        };
        let plot_records = if self.config.sync_plots {
            source.fetch_plots().await?
        } else {
            Vec::new()
        };
        let association_records = if self.config.sync_plot_occurrences {
            source.fetch_plot_occurrences().await?
        } else {
            Vec::new()
        };

        let mut run = SyncRun::new(provider.id);
        let mut warnings = Vec::new();

        let mut tx = self.pool.begin().await?;
        let outcome = self
            .execute(
                &mut tx,
                &provider,
                &mut run,
                occurrence_records,
                plot_records,
                association_records,
                &mut warnings,
            )
            .await;

        match outcome {
            Ok((occurrences, plots, plot_occurrences)) => {
                tx.commit().await?;
                run.advance(SyncState::Committed)?;

                let report = SyncReport {
                    run_id: run.id,
                    provider: provider.name.clone(),
                    occurrences,
                    plots,
                    plot_occurrences,
                    warnings,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };

                info!(
                    run_id = %run.id,
                    occurrences_inserted = report.occurrences.inserted,
                    occurrences_updated = report.occurrences.updated,
                    occurrences_deleted = report.occurrences.deleted,
                    plots_changed = report.plots.total_changed(),
                    plot_occurrences_changed = report.plot_occurrences.total_changed(),
                    elapsed_ms = report.elapsed_ms,
                    "Provider sync committed"
                );

                Ok(report)
            }
            Err(e) => {
                // Dropping the transaction rolls everything back; partial
                // sync is never observable.
                run.fail(e.to_string());
                warn!(run_id = %run.id, error = %e, "Provider sync rolled back");
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        provider: &DataProvider,
        run: &mut SyncRun,
        occurrence_records: Vec<OccurrenceRecord>,
        plot_records: Vec<PlotRecord>,
        association_records: Vec<PlotOccurrenceRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<(EntityDelta, EntityDelta, EntityDelta)> {
        let occurrences = if self.config.sync_occurrences {
            self.sync_occurrences(&mut *tx, provider, occurrence_records, warnings)
                .await?
        } else {
            debug!("Occurrence phase disabled by configuration");
            EntityDelta::skipped()
        };
        run.advance(SyncState::OccurrenceSynced)?;

        let plots = if self.config.sync_plots {
            self.sync_plots(&mut *tx, provider, plot_records).await?
        } else {
            debug!("Plot phase disabled by configuration");
            EntityDelta::skipped()
        };
        run.advance(SyncState::PlotSynced)?;

        let plot_occurrences = if self.config.sync_plot_occurrences {
            self.sync_plot_occurrences(&mut *tx, provider, association_records, warnings)
                .await?
        } else {
            debug!("Plot/occurrence phase disabled by configuration");
            EntityDelta::skipped()
        };
        run.advance(SyncState::PlotOccurrenceSynced)?;

        sqlx::query("UPDATE data_provider SET last_sync_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(provider.id)
            .execute(&mut **tx)
            .await?;

        Ok((occurrences, plots, plot_occurrences))
    }

    async fn sync_occurrences(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        provider: &DataProvider,
        records: Vec<OccurrenceRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<EntityDelta> {
        let conn: &mut SqliteConnection = &mut *tx;

        let synonym_key = match provider.synonym_key_id {
            Some(id) => {
                sqlx::query_as::<_, (String,)>("SELECT name FROM synonym_key_registry WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .map(|(name,)| name)
                    .ok_or_else(|| SyncError::Store(StoreError::not_found("synonym_key", id)))?
            }
            None => IDENTITY_SYNONYM_KEY.to_string(),
        };

        let mut provider_taxon_ids: Vec<String> = records
            .iter()
            .filter_map(|r| r.taxon_id.clone())
            .collect();
        provider_taxon_ids.sort_unstable();
        provider_taxon_ids.dedup();

        let resolution =
            SynonymMapper::resolve_with(&mut *conn, &synonym_key, &provider_taxon_ids).await?;
        if !resolution.unmatched.is_empty() {
            warnings.push(format!(
                "{} provider taxon identifier(s) have no canonical match under synonym key '{}'",
                resolution.unmatched.len(),
                synonym_key
            ));
        }

        let incoming: Vec<OccurrenceRow> = records
            .into_iter()
            .map(|record| {
                let taxon_id = record
                    .taxon_id
                    .as_deref()
                    .and_then(|ext| resolution.get(ext));
                OccurrenceRow::from_record(record, taxon_id)
            })
            .collect();

        let canonical = snapshot::canonical_occurrences(&mut *conn, provider.id).await?;
        let result = diff(&canonical, &incoming);
        let (inserted, updated, deleted) = result.counts();

        for row in &result.delete {
            let id = canonical_id(row.id, "occurrence", row.provider_pk)?;
            sqlx::query("DELETE FROM occurrence WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }

        for pair in &result.update {
            let id = canonical_id(pair.current.id, "occurrence", pair.current.provider_pk)?;
            sqlx::query(
                r#"
                UPDATE occurrence
                SET taxon_id = ?, provider_taxon_id = ?, location = ?, properties = ?
                WHERE id = ?
                "#,
            )
            .bind(pair.incoming.taxon_id)
            .bind(&pair.incoming.provider_taxon_id)
            .bind(&pair.incoming.location)
            .bind(Json(&pair.incoming.properties))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }

        for row in &result.insert {
            sqlx::query(
                r#"
                INSERT INTO occurrence (
                    provider_id, provider_pk, taxon_id, provider_taxon_id, location, properties
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(provider.id)
            .bind(row.provider_pk)
            .bind(row.taxon_id)
            .bind(&row.provider_taxon_id)
            .bind(&row.location)
            .bind(Json(&row.properties))
            .execute(&mut *conn)
            .await?;
        }

        debug!(inserted, updated, deleted, "Occurrence phase complete");

        Ok(EntityDelta {
            inserted,
            updated,
            deleted,
            skipped: false,
        })
    }

    async fn sync_plots(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        provider: &DataProvider,
        records: Vec<PlotRecord>,
    ) -> Result<EntityDelta> {
        let conn: &mut SqliteConnection = &mut *tx;

        let incoming: Vec<PlotRow> = records.into_iter().map(PlotRow::from_record).collect();
        let canonical = snapshot::canonical_plots(&mut *conn, provider.id).await?;
        let result = diff(&canonical, &incoming);
        let (inserted, updated, deleted) = result.counts();

        // Deletes run first so freed plot names can be taken by inserts.
        for row in &result.delete {
            let id = canonical_id(row.id, "plot", row.provider_pk)?;
            sqlx::query("DELETE FROM plot WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }

        for pair in &result.update {
            let id = canonical_id(pair.current.id, "plot", pair.current.provider_pk)?;
            sqlx::query("UPDATE plot SET name = ?, location = ?, properties = ? WHERE id = ?")
                .bind(&pair.incoming.name)
                .bind(&pair.incoming.location)
                .bind(Json(&pair.incoming.properties))
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }

        for row in &result.insert {
            sqlx::query(
                r#"
                INSERT INTO plot (provider_id, provider_pk, name, location, properties)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(provider.id)
            .bind(row.provider_pk)
            .bind(&row.name)
            .bind(&row.location)
            .bind(Json(&row.properties))
            .execute(&mut *conn)
            .await?;
        }

        debug!(inserted, updated, deleted, "Plot phase complete");

        Ok(EntityDelta {
            inserted,
            updated,
            deleted,
            skipped: false,
        })
    }

    async fn sync_plot_occurrences(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        provider: &DataProvider,
        records: Vec<PlotOccurrenceRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<EntityDelta> {
        let conn: &mut SqliteConnection = &mut *tx;

        let incoming = reindex_associations(&mut *conn, provider.id, records).await?;
        let sanitized = sanitize_associations(incoming, warnings);

        let canonical = snapshot::canonical_plot_occurrences(&mut *conn, provider.id).await?;
        let result = diff(&canonical, &sanitized);
        let (inserted, updated, deleted) = result.counts();

        apply_association_diff(&mut *conn, provider.id, &result).await?;

        debug!(inserted, updated, deleted, "Plot/occurrence phase complete");

        Ok(EntityDelta {
            inserted,
            updated,
            deleted,
            skipped: false,
        })
    }
}

fn canonical_id(id: Option<i64>, entity: &str, provider_pk: i64) -> Result<i64> {
    id.ok_or_else(|| {
        SyncError::incoherent(format!(
            "canonical {} snapshot row for provider pk {} carries no canonical id",
            entity, provider_pk
        ))
    })
}

/// Translate provider-local (plot, occurrence) pairs to canonical ids by
/// joining against the just-synced plot and occurrence tables.
///
/// Any provider-local reference with no canonical match means the provider
/// listed a plot or occurrence that was never synced — a fatal consistency
/// error.
async fn reindex_associations(
    conn: &mut SqliteConnection,
    provider_id: i64,
    records: Vec<PlotOccurrenceRecord>,
) -> Result<Vec<PlotOccurrenceRow>> {
    let plot_ids: HashMap<i64, i64> =
        sqlx::query_as::<_, (i64, i64)>("SELECT provider_pk, id FROM plot WHERE provider_id = ?")
            .bind(provider_id)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();
    let occurrence_ids: HashMap<i64, i64> = sqlx::query_as::<_, (i64, i64)>(
        "SELECT provider_pk, id FROM occurrence WHERE provider_id = ?",
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    let mut reindexed = Vec::with_capacity(records.len());
    let mut missing_plots = BTreeSet::new();
    let mut missing_occurrences = BTreeSet::new();

    for record in records {
        let plot_id = plot_ids.get(&record.plot_pk).copied();
        let occurrence_id = occurrence_ids.get(&record.occurrence_pk).copied();
        match (plot_id, occurrence_id) {
            (Some(plot_id), Some(occurrence_id)) => {
                reindexed.push(PlotOccurrenceRow::from_record(record, plot_id, occurrence_id));
            }
            (plot, occurrence) => {
                if plot.is_none() {
                    missing_plots.insert(record.plot_pk);
                }
                if occurrence.is_none() {
                    missing_occurrences.insert(record.occurrence_pk);
                }
            }
        }
    }

    if !missing_plots.is_empty() || !missing_occurrences.is_empty() {
        return Err(SyncError::incoherent(format!(
            "plot/occurrence associations reference rows that were never synced \
             (provider plot pks: {:?}, provider occurrence pks: {:?})",
            missing_plots, missing_occurrences
        )));
    }

    Ok(reindexed)
}

/// Drop duplicate association keys and duplicate (plot, identifier) pairs,
/// keeping the first of each; preserve null identifiers. All anomalies are
/// warnings, never errors.
fn sanitize_associations(
    incoming: Vec<PlotOccurrenceRow>,
    warnings: &mut Vec<String>,
) -> Vec<PlotOccurrenceRow> {
    let mut seen_keys: HashSet<(i64, i64)> = HashSet::new();
    let mut seen_identifiers: HashSet<(i64, String)> = HashSet::new();
    let mut sanitized = Vec::with_capacity(incoming.len());
    let mut dropped_keys = Vec::new();
    let mut dropped_identifiers = Vec::new();
    let mut null_identifiers = 0usize;

    for row in incoming {
        if !seen_keys.insert((row.provider_plot_pk, row.provider_occurrence_pk)) {
            dropped_keys.push(format!(
                "(plot pk {}, occurrence pk {})",
                row.provider_plot_pk, row.provider_occurrence_pk
            ));
            continue;
        }

        match &row.occurrence_identifier {
            Some(identifier) => {
                if seen_identifiers.insert((row.plot_id, identifier.clone())) {
                    sanitized.push(row);
                } else {
                    dropped_identifiers.push(format!(
                        "identifier '{}' on plot pk {} (occurrence pk {})",
                        identifier, row.provider_plot_pk, row.provider_occurrence_pk
                    ));
                }
            }
            None => {
                null_identifiers += 1;
                sanitized.push(row);
            }
        }
    }

    if !dropped_keys.is_empty() {
        let message = format!(
            "dropped {} duplicate association key(s), first kept: {}",
            dropped_keys.len(),
            dropped_keys.join("; ")
        );
        warn!("{}", message);
        warnings.push(message);
    }
    if !dropped_identifiers.is_empty() {
        let message = format!(
            "dropped {} duplicate occurrence identifier(s), first kept: {}",
            dropped_identifiers.len(),
            dropped_identifiers.join("; ")
        );
        warn!("{}", message);
        warnings.push(message);
    }
    if null_identifiers > 0 {
        let message = format!(
            "kept {} association(s) with null occurrence_identifier",
            null_identifiers
        );
        warn!("{}", message);
        warnings.push(message);
    }

    sanitized
}

/// Apply an association diff under simulated constraint deferral: deletes,
/// then identifier staging for updated rows, then updates, then inserts.
async fn apply_association_diff(
    conn: &mut SqliteConnection,
    provider_id: i64,
    result: &DiffSet<PlotOccurrenceRow>,
) -> Result<()> {
    for row in &result.delete {
        sqlx::query("DELETE FROM plot_occurrence WHERE plot_id = ? AND occurrence_id = ?")
            .bind(row.plot_id)
            .bind(row.occurrence_id)
            .execute(&mut *conn)
            .await?;
    }

    // Stage: identifiers of rows about to change cannot collide with the
    // values other updates are about to take.
    for pair in &result.update {
        sqlx::query(
            "UPDATE plot_occurrence SET occurrence_identifier = NULL \
             WHERE plot_id = ? AND occurrence_id = ?",
        )
        .bind(pair.current.plot_id)
        .bind(pair.current.occurrence_id)
        .execute(&mut *conn)
        .await?;
    }

    for pair in &result.update {
        sqlx::query(
            r#"
            UPDATE plot_occurrence
            SET plot_id = ?, occurrence_id = ?, occurrence_identifier = ?
            WHERE provider_id = ? AND provider_plot_pk = ? AND provider_occurrence_pk = ?
            "#,
        )
        .bind(pair.incoming.plot_id)
        .bind(pair.incoming.occurrence_id)
        .bind(&pair.incoming.occurrence_identifier)
        .bind(provider_id)
        .bind(pair.incoming.provider_plot_pk)
        .bind(pair.incoming.provider_occurrence_pk)
        .execute(&mut *conn)
        .await?;
    }

    for row in &result.insert {
        sqlx::query(
            r#"
            INSERT INTO plot_occurrence (
                plot_id, occurrence_id, provider_id,
                provider_plot_pk, provider_occurrence_pk, occurrence_identifier
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.plot_id)
        .bind(row.occurrence_id)
        .bind(provider_id)
        .bind(row.provider_plot_pk)
        .bind(row.provider_occurrence_pk)
        .bind(&row.occurrence_identifier)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
