use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{StoreError, TelemetryStore};
use crate::domain::{Metric, SeriesPoint, TelemetryRecord};

/// In-process store with the same ordering semantics as the SQL tables.
///
/// Duplicate timestamps are kept, in insertion order. `set_unavailable(true)`
/// makes every call fail with [`StoreError::Connect`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Metric, Vec<TelemetryRecord>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn records(&self, metric: Metric) -> Vec<TelemetryRecord> {
        self.tables
            .lock()
            .map(|t| t.get(&metric).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connect("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn with_table<R>(
        &self,
        metric: Metric,
        f: impl FnOnce(&mut Vec<TelemetryRecord>) -> R,
    ) -> Result<R, StoreError> {
        self.check_available()?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Query("memory store lock poisoned".to_string()))?;
        Ok(f(tables.entry(metric).or_default()))
    }
}

fn to_point(r: &TelemetryRecord) -> SeriesPoint {
    SeriesPoint::new(r.timestamp, r.rate_value)
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        self.with_table(record.metric, |rows| {
            let idx = rows.partition_point(|r| r.timestamp <= record.timestamp);
            rows.insert(idx, record.clone());
        })
    }

    async fn range(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        self.with_table(metric, |rows| {
            rows.iter()
                .filter(|r| r.timestamp >= start && r.timestamp <= end)
                .map(to_point)
                .collect()
        })
    }

    async fn latest(&self, metric: Metric, limit: usize) -> Result<Vec<SeriesPoint>, StoreError> {
        self.with_table(metric, |rows| {
            let skip = rows.len().saturating_sub(limit);
            rows.iter().skip(skip).map(to_point).collect()
        })
    }

    async fn readings(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        self.with_table(metric, |rows| {
            rows.iter()
                .filter(|r| r.timestamp >= start && r.timestamp <= end)
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(metric: Metric, ts: OffsetDateTime, rate: f64) -> TelemetryRecord {
        TelemetryRecord {
            device_id: "B1-201".to_string(),
            metric,
            timestamp: ts,
            rate_value: rate,
            cumulative_value: 100.0,
        }
    }

    #[tokio::test]
    async fn written_record_is_returned_by_covering_range() {
        let store = MemoryStore::new();
        let ts = datetime!(2024-05-01 10:00:00 +08:00);
        store.insert(&record(Metric::Water, ts, 12.5)).await.unwrap();

        let rows = store
            .range(Metric::Water, ts - time::Duration::minutes(1), ts + time::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(rows, vec![SeriesPoint::new(ts, 12.5)]);
        assert!(store
            .range(Metric::Gas, ts - time::Duration::minutes(1), ts)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn out_of_order_inserts_are_read_back_sorted() {
        let store = MemoryStore::new();
        let t0 = datetime!(2024-05-01 00:00:00 UTC);
        for (offset, v) in [(2, 3.0), (0, 1.0), (1, 2.0)] {
            store
                .insert(&record(Metric::Gas, t0 + time::Duration::hours(offset), v))
                .await
                .unwrap();
        }

        let values: Vec<f64> = store
            .range(Metric::Gas, t0, t0 + time::Duration::hours(2))
            .await
            .unwrap()
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn latest_returns_newest_in_chronological_order() {
        let store = MemoryStore::new();
        let t0 = datetime!(2024-05-01 00:00:00 UTC);
        for i in 0..5 {
            store
                .insert(&record(Metric::Electric, t0 + time::Duration::minutes(i), i as f64))
                .await
                .unwrap();
        }

        let values: Vec<f64> = store
            .latest(Metric::Electric, 2)
            .await
            .unwrap()
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![3.0, 4.0]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let ts = datetime!(2024-05-01 00:00:00 UTC);

        assert!(matches!(
            store.insert(&record(Metric::Gas, ts, 1.0)).await,
            Err(StoreError::Connect(_))
        ));
        assert!(store.latest(Metric::Gas, 10).await.is_err());
    }

    #[tokio::test]
    async fn readings_keep_the_device() {
        let store = MemoryStore::new();
        let ts = datetime!(2024-05-01 00:00:00 UTC);
        store.insert(&record(Metric::Gas, ts, 1.0)).await.unwrap();
        let mut other = record(Metric::Gas, ts, 2.0);
        other.device_id = "B2-101".to_string();
        store.insert(&other).await.unwrap();

        let rows = store.readings(Metric::Gas, ts, ts).await.unwrap();
        let devices: Vec<&str> = rows.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(devices, vec!["B1-201", "B2-101"]);
    }
}
