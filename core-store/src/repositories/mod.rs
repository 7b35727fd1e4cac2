//! Repository traits and SQLite implementations for the canonical store

pub mod occurrence;
pub mod plot;
pub mod plot_occurrence;
pub mod provider;
pub mod synonym_key;
pub mod taxon;

pub use occurrence::{OccurrenceRepository, SqliteOccurrenceRepository};
pub use plot::{PlotRepository, SqlitePlotRepository};
pub use plot_occurrence::{PlotOccurrenceRepository, SqlitePlotOccurrenceRepository};
pub use provider::{NewDataProvider, ProviderRepository, SqliteProviderRepository};
pub use synonym_key::{SqliteSynonymKeyRepository, SynonymKeyRepository};
pub use taxon::{SqliteTaxonRepository, TaxonRepository};
