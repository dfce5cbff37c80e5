use async_trait::async_trait;
use sqlx::{postgres::PgConnection, Connection};
use time::OffsetDateTime;

use super::{series_queries, StoreError, TelemetryStore};
use crate::domain::{Metric, SeriesPoint, TelemetryRecord};

/// Postgres-wire store that opens a fresh connection for every operation.
///
/// There is no pool: each call connects, runs one statement (autocommit) and
/// closes the connection whether or not the statement succeeded.
#[derive(Debug, Clone)]
pub struct PgTelemetryStore {
    uri: String,
}

impl PgTelemetryStore {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    async fn connect(&self) -> Result<PgConnection, StoreError> {
        PgConnection::connect(&self.uri)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))
    }
}

async fn release(conn: PgConnection) {
    if let Some(error) = close_error(conn.close().await) {
        // The statement already completed; the server may have dropped us first.
        tracing::debug!(error = %error, "closing store connection failed");
    }
}

fn close_error(res: Result<(), sqlx::Error>) -> Option<String> {
    res.err().map(|e| e.to_string())
}

#[async_trait]
impl TelemetryStore for PgTelemetryStore {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query(series_queries::insert_sql(record.metric))
            .bind(&record.device_id)
            .bind(record.timestamp)
            .bind(record.rate_value)
            .bind(record.cumulative_value)
            .execute(&mut conn)
            .await;
        release(conn).await;

        res.map(|_| ()).map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn range(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query_as::<_, SeriesPoint>(series_queries::range_sql(metric))
            .bind(start)
            .bind(end)
            .fetch_all(&mut conn)
            .await;
        release(conn).await;

        res.map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn latest(&self, metric: Metric, limit: usize) -> Result<Vec<SeriesPoint>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut conn = self.connect().await?;
        let res = sqlx::query_as::<_, SeriesPoint>(series_queries::latest_sql(metric))
            .bind(limit)
            .fetch_all(&mut conn)
            .await;
        release(conn).await;

        let mut rows = res.map_err(|e| StoreError::Query(e.to_string()))?;
        rows.reverse();
        Ok(rows)
    }

    async fn readings(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query_as::<_, (String, OffsetDateTime, f64, f64)>(series_queries::readings_sql(metric))
            .bind(start)
            .bind(end)
            .fetch_all(&mut conn)
            .await;
        release(conn).await;

        let rows = res.map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(device_id, timestamp, rate_value, cumulative_value)| TelemetryRecord {
                device_id,
                metric,
                timestamp,
                rate_value,
                cumulative_value,
            })
            .collect())
    }
}
