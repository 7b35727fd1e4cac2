//! Data provider registration repository

use crate::error::{Result, StoreError};
use crate::models::{DataProvider, PropertyMap};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{query_as, SqlitePool};
use tracing::info;

/// Registration request for a new external data source.
#[derive(Debug, Clone)]
pub struct NewDataProvider {
    /// Unique provider name
    pub name: String,
    /// Adapter type tag (e.g. "csv", "sqlite", "sql")
    pub provider_type: String,
    /// Synonym key name, or None for identity mapping
    pub synonym_key: Option<String>,
    /// Adapter configuration
    pub properties: PropertyMap,
}

/// Provider registration interface.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Register a new provider.
    ///
    /// # Errors
    ///
    /// - `RecordAlreadyExists` if a provider with the same name is registered
    /// - `NoRecordFound` if the configured synonym key is not registered
    async fn register(&self, new: NewDataProvider) -> Result<DataProvider>;

    /// Find a provider by its unique name.
    async fn find_by_name(&self, name: &str) -> Result<Option<DataProvider>>;

    /// Find a provider by canonical id.
    async fn find_by_id(&self, id: i64) -> Result<Option<DataProvider>>;

    /// List all registered providers, ordered by name.
    async fn list(&self) -> Result<Vec<DataProvider>>;

    /// Unregister a provider; cascades to its occurrences, plots and
    /// associations.
    ///
    /// Returns `true` if a provider was deleted.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// SQLite implementation of [`ProviderRepository`].
pub struct SqliteProviderRepository {
    pool: SqlitePool,
}

impl SqliteProviderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderRepository for SqliteProviderRepository {
    async fn register(&self, new: NewDataProvider) -> Result<DataProvider> {
        if self.find_by_name(&new.name).await?.is_some() {
            return Err(StoreError::already_exists("data_provider", &new.name));
        }

        let synonym_key_id = match &new.synonym_key {
            Some(key) => {
                let row: Option<(i64,)> =
                    query_as("SELECT id FROM synonym_key_registry WHERE name = ?")
                        .bind(key)
                        .fetch_optional(&self.pool)
                        .await?;
                Some(
                    row.map(|(id,)| id)
                        .ok_or_else(|| StoreError::not_found("synonym_key", key))?,
                )
            }
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO data_provider (name, provider_type, synonym_key_id, properties)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.provider_type)
        .bind(synonym_key_id)
        .bind(Json(&new.properties))
        .execute(&self.pool)
        .await?;

        info!(
            provider = %new.name,
            provider_type = %new.provider_type,
            "Registered data provider"
        );

        Ok(DataProvider {
            id: result.last_insert_rowid(),
            name: new.name,
            provider_type: new.provider_type,
            synonym_key_id,
            properties: Json(new.properties),
            last_sync_at: None,
        })
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<DataProvider>> {
        let provider = query_as::<_, DataProvider>("SELECT * FROM data_provider WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(provider)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<DataProvider>> {
        let provider = query_as::<_, DataProvider>("SELECT * FROM data_provider WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(provider)
    }

    async fn list(&self) -> Result<Vec<DataProvider>> {
        let providers = query_as::<_, DataProvider>("SELECT * FROM data_provider ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(providers)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_provider WHERE name = ?")
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

    fn sample(name: &str) -> NewDataProvider {
        NewDataProvider {
            name: name.to_string(),
            provider_type: "csv".to_string(),
            synonym_key: None,
            properties: PropertyMap::new(),
        }
    }

    #[tokio::test]
    async fn test_register_and_find() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProviderRepository::new(pool);

        let provider = repo.register(sample("herbarium")).await.unwrap();
        assert!(provider.id > 0);
        assert!(provider.last_sync_at.is_none());

        let found = repo.find_by_name("herbarium").await.unwrap().unwrap();
        assert_eq!(found, provider);
    }

    #[tokio::test]
    async fn test_register_duplicate_name_rejected() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProviderRepository::new(pool);

        repo.register(sample("herbarium")).await.unwrap();
        let err = repo.register(sample("herbarium")).await.unwrap_err();
        assert!(matches!(err, StoreError::RecordAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_register_with_unknown_synonym_key_rejected() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProviderRepository::new(pool);

        let mut new = sample("herbarium");
        new.synonym_key = Some("missing-key".to_string());

        let err = repo.register(new).await.unwrap_err();
        assert!(matches!(err, StoreError::NoRecordFound { .. }));
    }

    #[tokio::test]
    async fn test_register_with_identity_key() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProviderRepository::new(pool);

        let mut new = sample("herbarium");
        new.synonym_key = Some("canonical".to_string());

        let provider = repo.register(new).await.unwrap();
        assert!(provider.synonym_key_id.is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProviderRepository::new(pool);

        repo.register(sample("herbarium")).await.unwrap();
        assert!(repo.delete("herbarium").await.unwrap());
        assert!(!repo.delete("herbarium").await.unwrap());
        assert!(repo.find_by_name("herbarium").await.unwrap().is_none());
    }
}
