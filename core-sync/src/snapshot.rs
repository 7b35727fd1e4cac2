//! # Snapshot Reader
//!
//! Loads the canonical store's current rows for a provider as key-indexed
//! snapshots, and converts provider records into the same comparable shape.
//!
//! Canonical snapshot rows carry their canonical id; provider rows do not —
//! the diff engine pairs them up by provider-local key so the orchestrator
//! can apply updates and deletes against canonical identities.

use crate::diff::Reconcilable;
use crate::error::Result;
use core_store::PropertyMap;
use source_traits::{OccurrenceRecord, PlotOccurrenceRecord, PlotRecord};
use sqlx::types::Json;
use sqlx::SqliteConnection;

/// Comparable occurrence snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceRow {
    /// Canonical id; `None` on provider rows
    pub id: Option<i64>,
    pub provider_pk: i64,
    pub taxon_id: Option<i64>,
    pub provider_taxon_id: Option<String>,
    pub location: Option<String>,
    pub properties: PropertyMap,
}

impl OccurrenceRow {
    /// Build a provider-side row from an adapter record, with the taxon id
    /// already resolved through the synonym mapper.
    pub fn from_record(record: OccurrenceRecord, taxon_id: Option<i64>) -> Self {
        Self {
            id: None,
            provider_pk: record.pk,
            taxon_id,
            provider_taxon_id: record.taxon_id,
            location: record.location,
            properties: record.properties,
        }
    }
}

impl Reconcilable for OccurrenceRow {
    type Key = i64;

    fn provider_key(&self) -> i64 {
        self.provider_pk
    }

    fn content_matches(&self, incoming: &Self) -> bool {
        self.taxon_id == incoming.taxon_id
            && self.provider_taxon_id == incoming.provider_taxon_id
            && self.location == incoming.location
            && self.properties == incoming.properties
    }
}

/// Comparable plot snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRow {
    /// Canonical id; `None` on provider rows
    pub id: Option<i64>,
    pub provider_pk: i64,
    pub name: String,
    pub location: Option<String>,
    pub properties: PropertyMap,
}

impl PlotRow {
    pub fn from_record(record: PlotRecord) -> Self {
        Self {
            id: None,
            provider_pk: record.pk,
            name: record.name,
            location: record.location,
            properties: record.properties,
        }
    }
}

impl Reconcilable for PlotRow {
    type Key = i64;

    fn provider_key(&self) -> i64 {
        self.provider_pk
    }

    fn content_matches(&self, incoming: &Self) -> bool {
        self.name == incoming.name
            && self.location == incoming.location
            && self.properties == incoming.properties
    }
}

/// Comparable plot/occurrence association row.
///
/// Both sides of a diff carry canonical plot/occurrence ids: canonical rows
/// hold the stored references, provider rows hold the ones produced by
/// re-indexing the provider-local pair against the just-synced tables. A
/// changed canonical reference (a member was deleted and re-synced under a
/// new id) is therefore an update like any other field change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotOccurrenceRow {
    pub plot_id: i64,
    pub occurrence_id: i64,
    pub provider_plot_pk: i64,
    pub provider_occurrence_pk: i64,
    pub occurrence_identifier: Option<String>,
}

impl PlotOccurrenceRow {
    pub fn from_record(record: PlotOccurrenceRecord, plot_id: i64, occurrence_id: i64) -> Self {
        Self {
            plot_id,
            occurrence_id,
            provider_plot_pk: record.plot_pk,
            provider_occurrence_pk: record.occurrence_pk,
            occurrence_identifier: record.occurrence_identifier,
        }
    }
}

impl Reconcilable for PlotOccurrenceRow {
    type Key = (i64, i64);

    fn provider_key(&self) -> (i64, i64) {
        (self.provider_plot_pk, self.provider_occurrence_pk)
    }

    fn content_matches(&self, incoming: &Self) -> bool {
        self.plot_id == incoming.plot_id
            && self.occurrence_id == incoming.occurrence_id
            && self.occurrence_identifier == incoming.occurrence_identifier
    }
}

/// Read the canonical occurrence snapshot for a provider.
pub async fn canonical_occurrences(
    conn: &mut SqliteConnection,
    provider_id: i64,
) -> Result<Vec<OccurrenceRow>> {
    let rows: Vec<(i64, i64, Option<i64>, Option<String>, Option<String>, Json<PropertyMap>)> =
        sqlx::query_as(
            r#"
            SELECT id, provider_pk, taxon_id, provider_taxon_id, location, properties
            FROM occurrence WHERE provider_id = ?
            "#,
        )
        .bind(provider_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, provider_pk, taxon_id, provider_taxon_id, location, properties)| OccurrenceRow {
                id: Some(id),
                provider_pk,
                taxon_id,
                provider_taxon_id,
                location,
                properties: properties.0,
            },
        )
        .collect())
}

/// Read the canonical plot snapshot for a provider.
pub async fn canonical_plots(
    conn: &mut SqliteConnection,
    provider_id: i64,
) -> Result<Vec<PlotRow>> {
    let rows: Vec<(i64, i64, String, Option<String>, Json<PropertyMap>)> = sqlx::query_as(
        r#"
        SELECT id, provider_pk, name, location, properties
        FROM plot WHERE provider_id = ?
        "#,
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, provider_pk, name, location, properties)| PlotRow {
            id: Some(id),
            provider_pk,
            name,
            location,
            properties: properties.0,
        })
        .collect())
}

/// Read the canonical plot/occurrence association snapshot for a provider.
pub async fn canonical_plot_occurrences(
    conn: &mut SqliteConnection,
    provider_id: i64,
) -> Result<Vec<PlotOccurrenceRow>> {
    let rows: Vec<(i64, i64, i64, i64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT plot_id, occurrence_id, provider_plot_pk, provider_occurrence_pk,
               occurrence_identifier
        FROM plot_occurrence WHERE provider_id = ?
        "#,
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(plot_id, occurrence_id, provider_plot_pk, provider_occurrence_pk, occurrence_identifier)| {
                PlotOccurrenceRow {
                    plot_id,
                    occurrence_id,
                    provider_plot_pk,
                    provider_occurrence_pk,
                    occurrence_identifier,
                }
            },
        )
        .collect())
}
