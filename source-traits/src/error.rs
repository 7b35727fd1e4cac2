use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Malformed data source: {0}")]
    MalformedSource(String),

    #[error("Source database error: {0}")]
    Database(String),

    #[error("Source configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Error for a snapshot missing one or more required columns.
    pub fn missing_columns(entity: &str, missing: &[&str]) -> Self {
        SourceError::MalformedSource(format!(
            "{} snapshot is missing required column(s): {}",
            entity,
            missing.join(", ")
        ))
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
