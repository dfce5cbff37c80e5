use telemetry_client::{StoreError, TelemetryRecord, TelemetryStore};

/// Appends normalized records to their metric's table.
///
/// Each record is its own unit of work; nothing is batched or retried, so a
/// crash loses at most the record in flight.
pub struct IngestionWriter<S> {
    store: S,
}

impl<S> IngestionWriter<S>
where
    S: TelemetryStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn write(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        match self.store.insert(record).await {
            Ok(()) => {
                metrics::counter!("store_written_records_total", "metric" => record.metric.as_str())
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("store_write_failures_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use telemetry_client::{db::MemoryStore, Metric, SeriesPoint};
    use time::macros::datetime;

    #[tokio::test]
    async fn write_then_range_returns_the_rate_value() {
        let store = Arc::new(MemoryStore::new());
        let writer = IngestionWriter::new(store.clone());
        let ts = datetime!(2024-06-01 10:15:00 +8);

        writer
            .write(&TelemetryRecord {
                device_id: "B1-201".to_string(),
                metric: Metric::Gas,
                timestamp: ts,
                rate_value: 4.25,
                cumulative_value: 1500.0,
            })
            .await
            .unwrap();

        let rows = store.range(Metric::Gas, ts, ts).await.unwrap();
        assert_eq!(rows, vec![SeriesPoint::new(ts, 4.25)]);
    }
}
