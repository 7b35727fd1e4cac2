//! Plot/occurrence association repository

use crate::error::Result;
use crate::models::PlotOccurrence;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Plot/occurrence association read access.
#[async_trait]
pub trait PlotOccurrenceRepository: Send + Sync {
    /// List all associations owned by a provider, ordered by the
    /// provider-local (plot_pk, occurrence_pk) pair.
    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<PlotOccurrence>>;

    /// List all occurrences associated with a plot.
    async fn list_by_plot(&self, plot_id: i64) -> Result<Vec<PlotOccurrence>>;

    /// Count associations owned by a provider.
    async fn count_by_provider(&self, provider_id: i64) -> Result<i64>;
}

/// SQLite implementation of [`PlotOccurrenceRepository`].
pub struct SqlitePlotOccurrenceRepository {
    pool: SqlitePool,
}

impl SqlitePlotOccurrenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlotOccurrenceRepository for SqlitePlotOccurrenceRepository {
    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<PlotOccurrence>> {
        let rows = query_as::<_, PlotOccurrence>(
            r#"
            SELECT * FROM plot_occurrence
            WHERE provider_id = ?
            ORDER BY provider_plot_pk, provider_occurrence_pk
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_by_plot(&self, plot_id: i64) -> Result<Vec<PlotOccurrence>> {
        let rows = query_as::<_, PlotOccurrence>(
            "SELECT * FROM plot_occurrence WHERE plot_id = ? ORDER BY occurrence_id",
        )
        .bind(plot_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_by_provider(&self, provider_id: i64) -> Result<i64> {
        let (count,): (i64,) =
            query_as("SELECT COUNT(*) FROM plot_occurrence WHERE provider_id = ?")
                .bind(provider_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
