use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No record found: {entity} with key {key}")]
    NoRecordFound { entity: String, key: String },

    #[error("Record already exists: {entity} with key {key}")]
    RecordAlreadyExists { entity: String, key: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        StoreError::NoRecordFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn already_exists(entity: &str, key: impl ToString) -> Self {
        StoreError::RecordAlreadyExists {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
