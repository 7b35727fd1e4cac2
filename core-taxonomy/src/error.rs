use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Taxonomy input is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Taxon {child} references unknown parent {parent}")]
    UnknownParent { child: i64, parent: i64 },

    #[error("Cycle detected in parent pointers; unreachable taxa: {:?}", .0)]
    CycleDetected(Vec<i64>),

    #[error("Duplicate taxon id: {0}")]
    DuplicateTaxonId(i64),

    #[error("Invalid synonym key name: '{0}'")]
    InvalidSynonymKey(String),

    #[error("Malformed taxonomy input: {0}")]
    MalformedInput(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;
