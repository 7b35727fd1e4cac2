//! # SQLite Provider
//!
//! Embedded-database source adapters over an external SQLite file.
//!
//! ## Overview
//!
//! Two adapter variants live here:
//!
//! - [`SqliteSource`]: reads the standard table layout (`occurrence`, `plot`,
//!   `plot_occurrence`) from the source file.
//! - [`SqlQuerySource`]: runs caller-configured SELECT statements instead,
//!   for sources whose schema does not match the standard layout.
//!
//! Both open the file read-only, validate the result shape against the
//! required columns of the provider boundary before reading any row (so
//! malformed sources fail fast, even when empty), and put any extra result
//! column into the record's property map.

use async_trait::async_trait;
use serde_json::Value;
use source_traits::{
    DataSource, OccurrenceRecord, PlotOccurrenceRecord, PlotRecord, PropertyMap, SourceError,
    OCCURRENCE_COLUMNS, PLOT_COLUMNS, PLOT_OCCURRENCE_COLUMNS,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, SqliteConnection};
use std::path::{Path, PathBuf};
use tracing::debug;

const OCCURRENCE_QUERY: &str = "SELECT * FROM occurrence";
const PLOT_QUERY: &str = "SELECT * FROM plot";
const PLOT_OCCURRENCE_QUERY: &str = "SELECT * FROM plot_occurrence";

/// Embedded-database source reading the standard table layout.
pub struct SqliteSource {
    inner: QuerySet,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: QuerySet {
                path: path.into(),
                occurrence_query: Some(OCCURRENCE_QUERY.to_string()),
                plot_query: Some(PLOT_QUERY.to_string()),
                plot_occurrence_query: Some(PLOT_OCCURRENCE_QUERY.to_string()),
            },
        }
    }

    /// Build from provider configuration properties (`database` is the file
    /// path).
    pub fn from_properties(properties: &PropertyMap) -> Result<Self, SourceError> {
        Ok(Self::new(required_path(properties, "database")?))
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn fetch_occurrences(&self) -> source_traits::Result<Vec<OccurrenceRecord>> {
        self.inner.fetch_occurrences().await
    }

    async fn fetch_plots(&self) -> source_traits::Result<Vec<PlotRecord>> {
        self.inner.fetch_plots().await
    }

    async fn fetch_plot_occurrences(&self) -> source_traits::Result<Vec<PlotOccurrenceRecord>> {
        self.inner.fetch_plot_occurrences().await
    }
}

/// SQL-query-based source: caller-configured SELECTs over a SQLite file.
///
/// Each query must project the required columns of its entity; extra
/// projected columns become properties. A missing query means the provider
/// does not track that entity.
pub struct SqlQuerySource {
    inner: QuerySet,
}

impl SqlQuerySource {
    pub fn new(
        path: impl Into<PathBuf>,
        occurrence_query: Option<String>,
        plot_query: Option<String>,
        plot_occurrence_query: Option<String>,
    ) -> Self {
        Self {
            inner: QuerySet {
                path: path.into(),
                occurrence_query,
                plot_query,
                plot_occurrence_query,
            },
        }
    }

    /// Build from provider configuration properties: `database` plus
    /// `occurrence_query`, `plot_query`, `plot_occurrence_query`.
    pub fn from_properties(properties: &PropertyMap) -> Result<Self, SourceError> {
        Ok(Self::new(
            required_path(properties, "database")?,
            optional_string(properties, "occurrence_query")?,
            optional_string(properties, "plot_query")?,
            optional_string(properties, "plot_occurrence_query")?,
        ))
    }
}

#[async_trait]
impl DataSource for SqlQuerySource {
    async fn fetch_occurrences(&self) -> source_traits::Result<Vec<OccurrenceRecord>> {
        self.inner.fetch_occurrences().await
    }

    async fn fetch_plots(&self) -> source_traits::Result<Vec<PlotRecord>> {
        self.inner.fetch_plots().await
    }

    async fn fetch_plot_occurrences(&self) -> source_traits::Result<Vec<PlotOccurrenceRecord>> {
        self.inner.fetch_plot_occurrences().await
    }
}

/// Shared fetch plumbing for both variants.
struct QuerySet {
    path: PathBuf,
    occurrence_query: Option<String>,
    plot_query: Option<String>,
    plot_occurrence_query: Option<String>,
}

impl QuerySet {
    async fn fetch_occurrences(&self) -> source_traits::Result<Vec<OccurrenceRecord>> {
        let Some(query) = &self.occurrence_query else {
            return Ok(Vec::new());
        };
        let rows = self.run(query, "occurrence", OCCURRENCE_COLUMNS).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(OccurrenceRecord {
                pk: required_i64(row, "id")?,
                taxon_id: value_as_string(column_value(row, "taxon_id")),
                location: value_as_string(column_value(row, "location")),
                properties: extra_properties(row, OCCURRENCE_COLUMNS),
            });
        }
        Ok(records)
    }

    async fn fetch_plots(&self) -> source_traits::Result<Vec<PlotRecord>> {
        let Some(query) = &self.plot_query else {
            return Ok(Vec::new());
        };
        let rows = self.run(query, "plot", PLOT_COLUMNS).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = value_as_string(column_value(row, "name")).ok_or_else(|| {
                SourceError::MalformedSource("plot snapshot row with an empty name".to_string())
            })?;
            records.push(PlotRecord {
                pk: required_i64(row, "id")?,
                name,
                location: value_as_string(column_value(row, "location")),
                properties: extra_properties(row, PLOT_COLUMNS),
            });
        }
        Ok(records)
    }

    async fn fetch_plot_occurrences(&self) -> source_traits::Result<Vec<PlotOccurrenceRecord>> {
        let Some(query) = &self.plot_occurrence_query else {
            return Ok(Vec::new());
        };
        let rows = self
            .run(query, "plot_occurrence", PLOT_OCCURRENCE_COLUMNS)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(PlotOccurrenceRecord {
                plot_pk: required_i64(row, "plot_id")?,
                occurrence_pk: required_i64(row, "occurrence_id")?,
                occurrence_identifier: value_as_string(column_value(row, "occurrence_identifier")),
            });
        }
        Ok(records)
    }

    /// Open the file read-only, validate the query's result shape, run it.
    async fn run(
        &self,
        query: &str,
        entity: &str,
        required: &[&str],
    ) -> Result<Vec<SqliteRow>, SourceError> {
        let mut conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .connect()
            .await
            .map_err(|e| {
                SourceError::Database(format!(
                    "cannot open source database {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        // Describe before fetching so a missing column fails fast even on an
        // empty source.
        let description = conn
            .describe(query)
            .await
            .map_err(|e| SourceError::Database(e.to_string()))?;
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !description.columns().iter().any(|col| col.name() == **c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SourceError::missing_columns(entity, &missing));
        }

        let rows = conn
            .fetch_all(query)
            .await
            .map_err(|e| SourceError::Database(e.to_string()))?;

        debug!(
            path = %self.path.display(),
            entity,
            rows = rows.len(),
            "Read embedded-database snapshot"
        );

        conn.close().await.ok();
        Ok(rows)
    }
}

fn required_path(properties: &PropertyMap, key: &str) -> Result<PathBuf, SourceError> {
    match properties.get(key) {
        Some(Value::String(s)) => Ok(PathBuf::from(s)),
        _ => Err(SourceError::Configuration(format!(
            "property '{}' must be a file path string",
            key
        ))),
    }
}

fn optional_string(properties: &PropertyMap, key: &str) -> Result<Option<String>, SourceError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SourceError::Configuration(format!(
            "property '{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn required_i64(row: &SqliteRow, column: &str) -> Result<i64, SourceError> {
    match column_value(row, column) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            SourceError::MalformedSource(format!("non-integer value in column '{}'", column))
        }),
        Some(Value::String(s)) => s.parse::<i64>().map_err(|_| {
            SourceError::MalformedSource(format!(
                "unparsable integer '{}' in column '{}'",
                s, column
            ))
        }),
        _ => Err(SourceError::MalformedSource(format!(
            "row has no value for required column '{}'",
            column
        ))),
    }
}

/// Decode one column into a JSON value, trying integer, float, then text.
fn column_value(row: &SqliteRow, column: &str) -> Option<Value> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
        return v.map(Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(column) {
        return v.map(Value::from);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(column) {
        return v.map(Value::String);
    }
    None
}

fn value_as_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn extra_properties(row: &SqliteRow, known: &[&str]) -> PropertyMap {
    let mut properties = PropertyMap::new();
    for column in row.columns() {
        let name = column.name();
        if known.contains(&name) {
            continue;
        }
        if let Some(value) = column_value(row, name) {
            properties.insert(name.to_string(), value);
        }
    }
    properties
}
