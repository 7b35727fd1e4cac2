//! # Canonical Store Module
//!
//! Owns the canonical ecological database and provides repository patterns
//! for data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema and embedded migrations (providers, occurrences, plots,
//!   plot/occurrence associations, MPTT-encoded taxonomy, synonym keys)
//! - Repository patterns for registration and canonical reads
//! - Connection pooling tuned for a single sync writer with shared readers
//!
//! Writes to synchronized entities happen exclusively through the sync
//! orchestrator's transaction; repositories expose the canonical view.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{
    DataProvider, Occurrence, Plot, PlotOccurrence, PropertyMap, SynonymKey, Taxon, TaxonRank,
    IDENTITY_SYNONYM_KEY,
};
