//! Normalized snapshot record types
//!
//! Every adapter variant converts its native representation into these shapes.
//! Records are keyed by provider-local identifiers; canonical identifiers are
//! assigned by the store during reconciliation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open key/value map carried by occurrences, plots and providers.
///
/// A `BTreeMap` keeps entries in sorted key order, so two semantically equal
/// maps serialize and compare identically regardless of insertion order.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Required columns for an occurrence snapshot.
pub const OCCURRENCE_COLUMNS: &[&str] = &["id", "taxon_id", "location"];

/// Required columns for a plot snapshot.
pub const PLOT_COLUMNS: &[&str] = &["id", "name", "location"];

/// Required columns for a plot/occurrence association snapshot.
pub const PLOT_OCCURRENCE_COLUMNS: &[&str] = &["plot_id", "occurrence_id", "occurrence_identifier"];

/// A field occurrence as reported by an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    /// Provider-local primary key
    pub pk: i64,
    /// Taxon identifier in the provider's own identifier space
    pub taxon_id: Option<String>,
    /// Point location as WKT, geodetic coordinates
    pub location: Option<String>,
    /// Any additional columns the source carries
    pub properties: PropertyMap,
}

/// A survey plot as reported by an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRecord {
    /// Provider-local primary key
    pub pk: i64,
    /// Plot name, unique across the canonical store
    pub name: String,
    /// Point location as WKT, geodetic coordinates
    pub location: Option<String>,
    /// Any additional columns the source carries
    pub properties: PropertyMap,
}

/// A plot/occurrence association as reported by an external source.
///
/// Keyed by the composite (plot_pk, occurrence_pk) pair; both parts are
/// provider-local and are re-indexed to canonical identifiers by the sync
/// orchestrator after the plot and occurrence phases complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotOccurrenceRecord {
    /// Provider-local plot key
    pub plot_pk: i64,
    /// Provider-local occurrence key
    pub occurrence_pk: i64,
    /// Identifier of the occurrence within the plot, unique per plot
    pub occurrence_identifier: Option<String>,
}
