//! # Data Source Traits
//!
//! The provider-adapter boundary: traits and record types that every external
//! data source must implement to be synchronized into the canonical store.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and the concrete
//! source adapters. Each adapter exposes three read-only operations returning
//! tabular snapshots of the external source, keyed by provider-local
//! identifiers:
//!
//! - [`DataSource::fetch_occurrences`] - field occurrence records
//! - [`DataSource::fetch_plots`] - survey plot records
//! - [`DataSource::fetch_plot_occurrences`] - plot/occurrence associations
//!
//! Adapters are a closed set of variants (file-based, embedded-database,
//! SQL-query-based) implemented in the `provider-*` crates. Malformed input
//! (missing required columns, unparsable keys) must fail fast with
//! [`SourceError::MalformedSource`] before any reconciliation begins.

pub mod error;
pub mod records;
pub mod source;

pub use error::{Result, SourceError};
pub use records::{
    OccurrenceRecord, PlotOccurrenceRecord, PlotRecord, PropertyMap, OCCURRENCE_COLUMNS,
    PLOT_COLUMNS, PLOT_OCCURRENCE_COLUMNS,
};
pub use source::DataSource;
