//! # CSV Provider
//!
//! File-based source adapter: reads occurrence, plot and association
//! snapshots from CSV files.
//!
//! ## Overview
//!
//! Each entity snapshot is one CSV file with a header row. The required
//! columns per entity are those of the provider boundary
//! ([`source_traits::OCCURRENCE_COLUMNS`] and friends); any extra column
//! lands in the record's property map as a string value. Empty cells are
//! nulls. A file missing a required column fails fast before any
//! reconciliation.
//!
//! File paths come from the provider's configuration properties:
//! `occurrences`, `plots`, `plot_occurrences`. A missing entry means the
//! provider does not track that entity and yields an empty snapshot.

use async_trait::async_trait;
use serde_json::Value;
use source_traits::{
    DataSource, OccurrenceRecord, PlotOccurrenceRecord, PlotRecord, PropertyMap, SourceError,
    OCCURRENCE_COLUMNS, PLOT_COLUMNS, PLOT_OCCURRENCE_COLUMNS,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// CSV-file-backed data source.
pub struct CsvSource {
    occurrences_path: Option<PathBuf>,
    plots_path: Option<PathBuf>,
    plot_occurrences_path: Option<PathBuf>,
}

impl CsvSource {
    pub fn new(
        occurrences_path: Option<PathBuf>,
        plots_path: Option<PathBuf>,
        plot_occurrences_path: Option<PathBuf>,
    ) -> Self {
        Self {
            occurrences_path,
            plots_path,
            plot_occurrences_path,
        }
    }

    /// Build from provider configuration properties.
    pub fn from_properties(properties: &PropertyMap) -> std::result::Result<Self, SourceError> {
        let path_of = |key: &str| -> std::result::Result<Option<PathBuf>, SourceError> {
            match properties.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(PathBuf::from(s))),
                Some(other) => Err(SourceError::Configuration(format!(
                    "property '{}' must be a file path string, got {}",
                    key, other
                ))),
            }
        };

        Ok(Self::new(
            path_of("occurrences")?,
            path_of("plots")?,
            path_of("plot_occurrences")?,
        ))
    }
}

#[async_trait]
impl DataSource for CsvSource {
    async fn fetch_occurrences(&self) -> source_traits::Result<Vec<OccurrenceRecord>> {
        let Some(path) = &self.occurrences_path else {
            return Ok(Vec::new());
        };
        let table = CsvTable::read(path, "occurrence", OCCURRENCE_COLUMNS)?;

        let mut records = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            records.push(OccurrenceRecord {
                pk: row.required_i64("id")?,
                taxon_id: row.optional_string("taxon_id"),
                location: row.optional_string("location"),
                properties: row.extra_properties(OCCURRENCE_COLUMNS),
            });
        }

        debug!(path = %path.display(), rows = records.len(), "Read occurrence snapshot");
        Ok(records)
    }

    async fn fetch_plots(&self) -> source_traits::Result<Vec<PlotRecord>> {
        let Some(path) = &self.plots_path else {
            return Ok(Vec::new());
        };
        let table = CsvTable::read(path, "plot", PLOT_COLUMNS)?;

        let mut records = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let name = row.optional_string("name").ok_or_else(|| {
                SourceError::MalformedSource(format!(
                    "plot snapshot row with pk {:?} has an empty name",
                    row.optional_string("id")
                ))
            })?;
            records.push(PlotRecord {
                pk: row.required_i64("id")?,
                name,
                location: row.optional_string("location"),
                properties: row.extra_properties(PLOT_COLUMNS),
            });
        }

        debug!(path = %path.display(), rows = records.len(), "Read plot snapshot");
        Ok(records)
    }

    async fn fetch_plot_occurrences(&self) -> source_traits::Result<Vec<PlotOccurrenceRecord>> {
        let Some(path) = &self.plot_occurrences_path else {
            return Ok(Vec::new());
        };
        let table = CsvTable::read(path, "plot_occurrence", PLOT_OCCURRENCE_COLUMNS)?;

        let mut records = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            records.push(PlotOccurrenceRecord {
                plot_pk: row.required_i64("plot_id")?,
                occurrence_pk: row.required_i64("occurrence_id")?,
                occurrence_identifier: row.optional_string("occurrence_identifier"),
            });
        }

        debug!(path = %path.display(), rows = records.len(), "Read association snapshot");
        Ok(records)
    }
}

/// One parsed CSV file: header plus cell maps per row.
struct CsvTable {
    rows: Vec<CsvRow>,
}

struct CsvRow {
    cells: BTreeMap<String, String>,
}

impl CsvTable {
    fn read(
        path: &Path,
        entity: &str,
        required: &[&str],
    ) -> std::result::Result<Self, SourceError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| {
            SourceError::MalformedSource(format!(
                "cannot open {} snapshot {}: {}",
                entity,
                path.display(),
                e
            ))
        })?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| SourceError::MalformedSource(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !headers.iter().any(|h| h == **c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SourceError::missing_columns(entity, &missing));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SourceError::MalformedSource(e.to_string()))?;
            let cells: BTreeMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, cell)| !cell.trim().is_empty())
                .map(|(header, cell)| (header.clone(), cell.trim().to_string()))
                .collect();
            rows.push(CsvRow { cells });
        }

        Ok(Self { rows })
    }
}

impl CsvRow {
    fn required_i64(&self, column: &str) -> std::result::Result<i64, SourceError> {
        let cell = self.cells.get(column).ok_or_else(|| {
            SourceError::MalformedSource(format!("row has no value for required column '{}'", column))
        })?;
        cell.parse::<i64>().map_err(|_| {
            SourceError::MalformedSource(format!(
                "unparsable integer '{}' in column '{}'",
                cell, column
            ))
        })
    }

    fn optional_string(&self, column: &str) -> Option<String> {
        self.cells.get(column).cloned()
    }

    fn extra_properties(&self, known: &[&str]) -> PropertyMap {
        self.cells
            .iter()
            .filter(|(column, _)| !known.contains(&column.as_str()))
            .map(|(column, cell)| (column.clone(), Value::String(cell.clone())))
            .collect()
    }
}
