//! Occurrence repository trait and implementation

use crate::error::Result;
use crate::models::Occurrence;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Occurrence read access.
///
/// Occurrence rows are mutated only by the sync orchestrator; this repository
/// exposes the canonical view of what a provider currently owns.
#[async_trait]
pub trait OccurrenceRepository: Send + Sync {
    /// Find an occurrence by canonical id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Occurrence>>;

    /// Find an occurrence by its provider-local identity.
    async fn find_by_provider_pk(&self, provider_id: i64, provider_pk: i64)
        -> Result<Option<Occurrence>>;

    /// List all occurrences owned by a provider, ordered by provider_pk.
    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<Occurrence>>;

    /// Count occurrences owned by a provider.
    async fn count_by_provider(&self, provider_id: i64) -> Result<i64>;
}

/// SQLite implementation of [`OccurrenceRepository`].
pub struct SqliteOccurrenceRepository {
    pool: SqlitePool,
}

impl SqliteOccurrenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OccurrenceRepository for SqliteOccurrenceRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Occurrence>> {
        let occurrence = query_as::<_, Occurrence>("SELECT * FROM occurrence WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(occurrence)
    }

    async fn find_by_provider_pk(
        &self,
        provider_id: i64,
        provider_pk: i64,
    ) -> Result<Option<Occurrence>> {
        let occurrence = query_as::<_, Occurrence>(
            "SELECT * FROM occurrence WHERE provider_id = ? AND provider_pk = ?",
        )
        .bind(provider_id)
        .bind(provider_pk)
        .fetch_optional(&self.pool)
        .await?;

        Ok(occurrence)
    }

    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<Occurrence>> {
        let occurrences = query_as::<_, Occurrence>(
            "SELECT * FROM occurrence WHERE provider_id = ? ORDER BY provider_pk",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(occurrences)
    }

    async fn count_by_provider(&self, provider_id: i64) -> Result<i64> {
        let (count,): (i64,) =
            query_as("SELECT COUNT(*) FROM occurrence WHERE provider_id = ?")
                .bind(provider_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
