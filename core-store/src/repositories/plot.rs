//! Plot repository trait and implementation

use crate::error::Result;
use crate::models::Plot;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Plot read access.
#[async_trait]
pub trait PlotRepository: Send + Sync {
    /// Find a plot by canonical id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Plot>>;

    /// Find a plot by its unique name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Plot>>;

    /// List all plots owned by a provider, ordered by provider_pk.
    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<Plot>>;

    /// Count plots owned by a provider.
    async fn count_by_provider(&self, provider_id: i64) -> Result<i64>;
}

/// SQLite implementation of [`PlotRepository`].
pub struct SqlitePlotRepository {
    pool: SqlitePool,
}

impl SqlitePlotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlotRepository for SqlitePlotRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Plot>> {
        let plot = query_as::<_, Plot>("SELECT * FROM plot WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(plot)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Plot>> {
        let plot = query_as::<_, Plot>("SELECT * FROM plot WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(plot)
    }

    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<Plot>> {
        let plots =
            query_as::<_, Plot>("SELECT * FROM plot WHERE provider_id = ? ORDER BY provider_pk")
                .bind(provider_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(plots)
    }

    async fn count_by_provider(&self, provider_id: i64) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM plot WHERE provider_id = ?")
            .bind(provider_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
