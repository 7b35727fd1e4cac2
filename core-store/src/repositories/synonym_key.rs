//! Synonym key registry repository

use crate::error::{Result, StoreError};
use crate::models::SynonymKey;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Registry of named external taxonomic identifier spaces.
#[async_trait]
pub trait SynonymKeyRepository: Send + Sync {
    /// Register a new synonym key.
    ///
    /// # Errors
    ///
    /// Returns `RecordAlreadyExists` if the name is already registered.
    async fn register(&self, name: &str) -> Result<SynonymKey>;

    /// Find a key by name.
    async fn find_by_name(&self, name: &str) -> Result<Option<SynonymKey>>;

    /// List all registered keys, ordered by name.
    async fn list(&self) -> Result<Vec<SynonymKey>>;

    /// Remove a key by name. Returns `true` if a key was deleted.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// SQLite implementation of [`SynonymKeyRepository`].
pub struct SqliteSynonymKeyRepository {
    pool: SqlitePool,
}

impl SqliteSynonymKeyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SynonymKeyRepository for SqliteSynonymKeyRepository {
    async fn register(&self, name: &str) -> Result<SynonymKey> {
        if self.find_by_name(name).await?.is_some() {
            return Err(StoreError::already_exists("synonym_key", name));
        }

        let result = sqlx::query("INSERT INTO synonym_key_registry (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(SynonymKey {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<SynonymKey>> {
        let key = query_as::<_, SynonymKey>("SELECT * FROM synonym_key_registry WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    async fn list(&self) -> Result<Vec<SynonymKey>> {
        let keys = query_as::<_, SynonymKey>("SELECT * FROM synonym_key_registry ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM synonym_key_registry WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::IDENTITY_SYNONYM_KEY;

    #[tokio::test]
    async fn test_register_and_list() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSynonymKeyRepository::new(pool);

        repo.register("gbif").await.unwrap();
        repo.register("taxref").await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["canonical", "gbif", "taxref"]);
    }

    #[tokio::test]
    async fn test_register_duplicate_rejected() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSynonymKeyRepository::new(pool);

        repo.register("gbif").await.unwrap();
        let err = repo.register("gbif").await.unwrap_err();
        assert!(matches!(err, StoreError::RecordAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_identity_key_is_preregistered() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSynonymKeyRepository::new(pool);

        let key = repo.find_by_name(IDENTITY_SYNONYM_KEY).await.unwrap();
        assert!(key.is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSynonymKeyRepository::new(pool);

        repo.register("gbif").await.unwrap();
        assert!(repo.delete("gbif").await.unwrap());
        assert!(!repo.delete("gbif").await.unwrap());
    }
}
