use core_store::StoreError;
use source_traits::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Incoherent database state: {0}")]
    IncoherentDatabaseState(String),

    #[error("No source adapter registered for provider type '{0}'")]
    UnknownProviderType(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SyncError {
    /// Fatal consistency error: the provider referenced a row that was never
    /// synced. The whole sync rolls back.
    pub fn incoherent(message: impl Into<String>) -> Self {
        SyncError::IncoherentDatabaseState(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
