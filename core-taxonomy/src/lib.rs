//! # Taxonomy Module
//!
//! Builds and replaces the hierarchical taxonomic reference.
//!
//! ## Overview
//!
//! Two pieces make up this module:
//!
//! - **MPTT Builder** (`mptt`): derives nested-set coordinates
//!   (left/right/tree_id/depth) for a forest of taxonomic trees from
//!   parent-pointer edges, iteratively and deterministically.
//! - **Taxonomy Replacement** (`import`): atomically replaces the taxon
//!   table from a tabular input and reconciles the synonym key registry,
//!   managing per-key uniqueness indexes along the way.
//!
//! The taxonomy pipeline is independent of provider sync; the synonym mapper
//! in `core-sync` consumes what is built here.

pub mod error;
pub mod import;
pub mod mptt;

pub use error::{Result, TaxonomyError};
pub use import::{
    TaxonomyImportReport, TaxonomyImporter, TaxonomyRecord, TaxonomyTable, REQUIRED_COLUMNS,
};
pub use mptt::{build_forest, NodeCoordinates, TaxonNode};
