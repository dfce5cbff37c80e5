use async_trait::async_trait;
use time::OffsetDateTime;

use crate::domain::{Metric, SeriesPoint, TelemetryRecord};

pub mod memory;
pub mod postgres;
pub mod series_queries;

pub use memory::MemoryStore;
pub use postgres::PgTelemetryStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connect(String),
    #[error("store query failed: {0}")]
    Query(String),
}

/// Time-ordered storage for the three metric tables.
///
/// Implementations acquire whatever connection they need for the duration of
/// one call and release it before returning, on success and on failure.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), StoreError>;

    /// Samples with `start <= timestamp <= end`, ascending by timestamp.
    async fn range(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, StoreError>;

    /// The `limit` most recent samples, returned in chronological order.
    async fn latest(&self, metric: Metric, limit: usize) -> Result<Vec<SeriesPoint>, StoreError>;

    /// Full records with `start <= timestamp <= end`, ascending by timestamp.
    /// Unlike [`range`](Self::range) this keeps the device of each row.
    async fn readings(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<TelemetryRecord>, StoreError>;
}

#[async_trait]
impl<T> TelemetryStore for std::sync::Arc<T>
where
    T: TelemetryStore + ?Sized,
{
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        (**self).insert(record).await
    }

    async fn range(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        (**self).range(metric, start, end).await
    }

    async fn latest(&self, metric: Metric, limit: usize) -> Result<Vec<SeriesPoint>, StoreError> {
        (**self).latest(metric, limit).await
    }

    async fn readings(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        (**self).readings(metric, start, end).await
    }
}
