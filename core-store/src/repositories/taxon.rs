//! Taxon repository trait and implementation
//!
//! Subtree and descendant queries run as interval-containment lookups over
//! the MPTT coordinates, so no recursive SQL is needed.

use crate::error::Result;
use crate::models::Taxon;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Taxonomic reference read access.
#[async_trait]
pub trait TaxonRepository: Send + Sync {
    /// Find a taxon by canonical id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Taxon>>;

    /// Find a taxon by its unique full name.
    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<Taxon>>;

    /// List the roots of every taxonomic tree, ordered by id.
    async fn list_roots(&self) -> Result<Vec<Taxon>>;

    /// List the direct children of a taxon, ordered by id.
    async fn list_children(&self, id: i64) -> Result<Vec<Taxon>>;

    /// List every descendant of a taxon in preorder, using the nested-set
    /// interval.
    async fn list_descendants(&self, id: i64) -> Result<Vec<Taxon>>;

    /// Count all taxa.
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of [`TaxonRepository`].
pub struct SqliteTaxonRepository {
    pool: SqlitePool,
}

impl SqliteTaxonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaxonRepository for SqliteTaxonRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Taxon>> {
        let taxon = query_as::<_, Taxon>("SELECT * FROM taxon WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(taxon)
    }

    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<Taxon>> {
        let taxon = query_as::<_, Taxon>("SELECT * FROM taxon WHERE full_name = ?")
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(taxon)
    }

    async fn list_roots(&self) -> Result<Vec<Taxon>> {
        let taxa = query_as::<_, Taxon>("SELECT * FROM taxon WHERE parent_id IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(taxa)
    }

    async fn list_children(&self, id: i64) -> Result<Vec<Taxon>> {
        let taxa = query_as::<_, Taxon>("SELECT * FROM taxon WHERE parent_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(taxa)
    }

    async fn list_descendants(&self, id: i64) -> Result<Vec<Taxon>> {
        let taxa = query_as::<_, Taxon>(
            r#"
            SELECT d.* FROM taxon d
            JOIN taxon a ON a.id = ?
            WHERE d.mptt_tree_id = a.mptt_tree_id
              AND d.mptt_left > a.mptt_left
              AND d.mptt_right < a.mptt_right
            ORDER BY d.mptt_left
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(taxa)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM taxon")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
