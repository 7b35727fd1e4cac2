//! Workspace aggregate crate.
//!
//! Re-exports the member crates and wires the built-in source adapters into
//! a ready-to-use registry. Host applications can depend on
//! `canopy-workspace` alone instead of wiring each crate individually.

pub use core_store as store;
pub use core_sync as sync;
pub use core_taxonomy as taxonomy;
pub use provider_csv::CsvSource;
pub use provider_sqlite::{SqlQuerySource, SqliteSource};
pub use source_traits::DataSource;

use core_sync::SourceRegistry;
use std::sync::Arc;

/// Registry with every built-in source adapter, keyed by provider type tag:
/// `csv` (file-based), `sqlite` (embedded database, standard layout) and
/// `sql` (embedded database, caller-configured queries).
///
/// Built once at process start and passed into the
/// [`core_sync::SyncOrchestrator`]; tests can build their own registry with
/// mock factories instead.
pub fn default_source_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(
        "csv",
        Arc::new(|properties| {
            CsvSource::from_properties(properties).map(|s| Arc::new(s) as Arc<dyn DataSource>)
        }),
    );
    registry.register(
        "sqlite",
        Arc::new(|properties| {
            SqliteSource::from_properties(properties).map(|s| Arc::new(s) as Arc<dyn DataSource>)
        }),
    );
    registry.register(
        "sql",
        Arc::new(|properties| {
            SqlQuerySource::from_properties(properties).map(|s| Arc::new(s) as Arc<dyn DataSource>)
        }),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_tags() {
        let registry = default_source_registry();
        assert_eq!(registry.tags(), vec!["csv", "sql", "sqlite"]);
    }
}
