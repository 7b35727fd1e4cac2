//! Data source capability trait

use crate::error::Result;
use crate::records::{OccurrenceRecord, PlotOccurrenceRecord, PlotRecord};
use async_trait::async_trait;

/// Read-only access to an external provider's current snapshot.
///
/// Implementations are selected once at sync start and must be side-effect
/// free: fetching a snapshot never mutates the source. A provider that does
/// not track one of the entity collections returns an empty vector for it.
///
/// # Errors
///
/// Implementations must fail fast with [`crate::SourceError::MalformedSource`]
/// when the underlying data is missing required columns or a provider-local
/// key cannot be parsed, so the sync aborts before any write occurs.
///
/// # Example
///
/// ```ignore
/// use source_traits::DataSource;
///
/// async fn count(source: &dyn DataSource) -> source_traits::Result<usize> {
///     Ok(source.fetch_occurrences().await?.len())
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the full occurrence snapshot, keyed by provider-local pk.
    async fn fetch_occurrences(&self) -> Result<Vec<OccurrenceRecord>>;

    /// Fetch the full plot snapshot, keyed by provider-local pk.
    async fn fetch_plots(&self) -> Result<Vec<PlotRecord>>;

    /// Fetch the full plot/occurrence association snapshot, keyed by the
    /// provider-local (plot_pk, occurrence_pk) pair.
    async fn fetch_plot_occurrences(&self) -> Result<Vec<PlotOccurrenceRecord>>;
}
