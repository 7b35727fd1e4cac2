//! Domain models for the canonical ecological store
//!
//! Rich domain models with validation and database mapping. Provider-local
//! identity is the (provider_id, provider_pk) pair; `id` is the canonical
//! store-assigned identifier.

use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

pub use source_traits::PropertyMap;

/// Name of the reserved identity synonym key.
///
/// When a provider has no synonym key configured, its taxon identifiers are
/// treated as canonical taxon ids and pass through unmapped.
pub const IDENTITY_SYNONYM_KEY: &str = "canonical";

// =============================================================================
// Taxonomic rank
// =============================================================================

/// Taxonomic rank, from kingdom down to infraspecific level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaxonRank {
    Regnum,
    Phylum,
    Classis,
    Ordo,
    Familia,
    Genus,
    Species,
    Infraspecies,
}

impl TaxonRank {
    /// String representation used for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonRank::Regnum => "REGNUM",
            TaxonRank::Phylum => "PHYLUM",
            TaxonRank::Classis => "CLASSIS",
            TaxonRank::Ordo => "ORDO",
            TaxonRank::Familia => "FAMILIA",
            TaxonRank::Genus => "GENUS",
            TaxonRank::Species => "SPECIES",
            TaxonRank::Infraspecies => "INFRASPECIES",
        }
    }
}

impl FromStr for TaxonRank {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "REGNUM" => Ok(TaxonRank::Regnum),
            "PHYLUM" => Ok(TaxonRank::Phylum),
            "CLASSIS" => Ok(TaxonRank::Classis),
            "ORDO" => Ok(TaxonRank::Ordo),
            "FAMILIA" => Ok(TaxonRank::Familia),
            "GENUS" => Ok(TaxonRank::Genus),
            "SPECIES" => Ok(TaxonRank::Species),
            "INFRASPECIES" => Ok(TaxonRank::Infraspecies),
            _ => Err(StoreError::InvalidInput {
                field: "rank".to_string(),
                message: format!("unknown taxonomic rank '{}'", s),
            }),
        }
    }
}

impl fmt::Display for TaxonRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// A registered external data source instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DataProvider {
    /// Canonical identifier
    pub id: i64,
    /// Unique provider name
    pub name: String,
    /// Adapter type tag resolved against the source registry
    pub provider_type: String,
    /// Synonym key used to map this provider's taxon ids; None means identity
    pub synonym_key_id: Option<i64>,
    /// Adapter configuration (file paths, queries, ...)
    pub properties: Json<PropertyMap>,
    /// Unix timestamp of the last successful sync
    pub last_sync_at: Option<i64>,
}

/// A field occurrence owned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Occurrence {
    /// Canonical identifier
    pub id: i64,
    /// Owning provider
    pub provider_id: i64,
    /// Provider-local primary key
    pub provider_pk: i64,
    /// Point location as WKT
    pub location: Option<String>,
    /// Canonical taxon reference, resolved through the synonym mapper
    pub taxon_id: Option<i64>,
    /// Taxon identifier in the provider's own identifier space
    pub provider_taxon_id: Option<String>,
    /// Additional source columns
    pub properties: Json<PropertyMap>,
}

/// A survey plot owned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Plot {
    /// Canonical identifier
    pub id: i64,
    /// Owning provider
    pub provider_id: i64,
    /// Provider-local primary key
    pub provider_pk: i64,
    /// Plot name, unique across the store
    pub name: String,
    /// Point location as WKT
    pub location: Option<String>,
    /// Additional source columns
    pub properties: Json<PropertyMap>,
}

impl Plot {
    /// Validate plot data before persisting.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Plot name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// An association between a plot and an occurrence.
///
/// Composite primary key (plot_id, occurrence_id); the secondary
/// (plot_id, occurrence_identifier) uniqueness is enforced by a partial
/// unique index and write sequencing during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlotOccurrence {
    /// Canonical plot reference
    pub plot_id: i64,
    /// Canonical occurrence reference
    pub occurrence_id: i64,
    /// Owning provider
    pub provider_id: i64,
    /// Provider-local plot key
    pub provider_plot_pk: i64,
    /// Provider-local occurrence key
    pub provider_occurrence_pk: i64,
    /// Identifier of the occurrence within the plot
    pub occurrence_identifier: Option<String>,
}

/// A node of the taxonomic reference, MPTT-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Taxon {
    /// Canonical identifier, assigned by the taxonomy import
    pub id: i64,
    /// Full scientific name, unique
    pub full_name: String,
    /// Rank label as supplied by the import
    pub rank_name: String,
    /// Normalized rank
    pub rank: TaxonRank,
    /// Parent node; None for tree roots
    pub parent_id: Option<i64>,
    /// Synonym key -> external identifier map
    pub synonyms: Json<PropertyMap>,
    /// Nested-set left bound
    pub mptt_left: i64,
    /// Nested-set right bound
    pub mptt_right: i64,
    /// Root id of the tree this node belongs to
    pub mptt_tree_id: i64,
    /// Depth below the root (root = 0)
    pub mptt_depth: i64,
}

impl Taxon {
    /// Number of descendants encoded by the nested-set interval.
    pub fn descendant_count(&self) -> i64 {
        (self.mptt_right - self.mptt_left - 1) / 2
    }

    /// Whether this node is a tree root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Validate the nested-set invariant for this row.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("Taxon full_name cannot be empty".to_string());
        }
        if self.mptt_left >= self.mptt_right {
            return Err("Taxon mptt_left must be strictly less than mptt_right".to_string());
        }
        if (self.mptt_right - self.mptt_left) % 2 == 0 {
            return Err("Taxon nested-set interval width must be odd".to_string());
        }
        Ok(())
    }
}

/// A registered synonym key: a named external taxonomic identifier space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SynonymKey {
    pub id: i64,
    pub name: String,
}

impl SynonymKey {
    /// Whether this is the reserved identity key.
    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY_SYNONYM_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_round_trip() {
        for rank in [
            TaxonRank::Regnum,
            TaxonRank::Phylum,
            TaxonRank::Classis,
            TaxonRank::Ordo,
            TaxonRank::Familia,
            TaxonRank::Genus,
            TaxonRank::Species,
            TaxonRank::Infraspecies,
        ] {
            assert_eq!(rank.as_str().parse::<TaxonRank>().unwrap(), rank);
        }
    }

    #[test]
    fn test_rank_parse_case_insensitive() {
        assert_eq!("familia".parse::<TaxonRank>().unwrap(), TaxonRank::Familia);
        assert!("SUBTRIBE".parse::<TaxonRank>().is_err());
    }

    #[test]
    fn test_rank_ordering() {
        assert!(TaxonRank::Regnum < TaxonRank::Familia);
        assert!(TaxonRank::Species < TaxonRank::Infraspecies);
    }

    #[test]
    fn test_taxon_descendant_count() {
        let taxon = Taxon {
            id: 1,
            full_name: "Plantae".to_string(),
            rank_name: "Kingdom".to_string(),
            rank: TaxonRank::Regnum,
            parent_id: None,
            synonyms: Json(PropertyMap::new()),
            mptt_left: 1,
            mptt_right: 8,
            mptt_tree_id: 1,
            mptt_depth: 0,
        };

        assert!(taxon.validate().is_ok());
        assert_eq!(taxon.descendant_count(), 3);
        assert!(taxon.is_root());
    }

    #[test]
    fn test_taxon_validate_rejects_inverted_interval() {
        let taxon = Taxon {
            id: 1,
            full_name: "Plantae".to_string(),
            rank_name: "Kingdom".to_string(),
            rank: TaxonRank::Regnum,
            parent_id: None,
            synonyms: Json(PropertyMap::new()),
            mptt_left: 4,
            mptt_right: 2,
            mptt_tree_id: 1,
            mptt_depth: 0,
        };

        assert!(taxon.validate().is_err());
    }

    #[test]
    fn test_plot_validate() {
        let plot = Plot {
            id: 1,
            provider_id: 1,
            provider_pk: 10,
            name: "  ".to_string(),
            location: None,
            properties: Json(PropertyMap::new()),
        };

        assert!(plot.validate().is_err());
    }

    #[test]
    fn test_synonym_key_identity() {
        let key = SynonymKey {
            id: 1,
            name: IDENTITY_SYNONYM_KEY.to_string(),
        };
        assert!(key.is_identity());
    }
}
