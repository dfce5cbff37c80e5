use std::time::SystemTime;

use telemetry_client::{StoreError, TelemetryStore};

use crate::{
    normalize::{NormalizationError, Normalizer},
    sinks::IngestionWriter,
};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

/// A publish received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("normalization error: {0}")]
    Normalize(#[from] NormalizationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Receives every message of a transport connection, one at a time.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Envelope<InboundMessage>) -> Result<(), PipelineError>;
}

/// Write path: normalize, then write the record as its own unit of work.
pub struct IngestPipeline<S> {
    normalizer: Normalizer,
    writer: IngestionWriter<S>,
}

impl<S> IngestPipeline<S>
where
    S: TelemetryStore,
{
    pub fn new(normalizer: Normalizer, writer: IngestionWriter<S>) -> Self {
        Self { normalizer, writer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }
}

#[async_trait::async_trait]
impl<S> MessageHandler for IngestPipeline<S>
where
    S: TelemetryStore,
{
    async fn handle(&self, message: Envelope<InboundMessage>) -> Result<(), PipelineError> {
        let record = match self.normalizer.normalize(&message) {
            Ok(record) => record,
            Err(e) => {
                metrics::counter!("normalization_rejected_total").increment(1);
                return Err(e.into());
            }
        };

        self.writer.write(&record).await?;

        if let Ok(dur) = SystemTime::now().duration_since(message.received_at) {
            metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::TopicRoutes;
    use std::sync::Arc;
    use telemetry_client::{db::MemoryStore, Metric};
    use time::macros::offset;

    fn pipeline(store: Arc<MemoryStore>) -> IngestPipeline<Arc<MemoryStore>> {
        let routes = TopicRoutes::default()
            .with_route("campus/energy/water", crate::normalize::Route::Fixed(Metric::Water));
        IngestPipeline::new(Normalizer::new(routes, offset!(+8)), IngestionWriter::new(store))
    }

    fn water(body: &str) -> Envelope<InboundMessage> {
        Envelope::now(InboundMessage::new("campus/energy/water", body.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn malformed_message_does_not_stop_later_ones() {
        let store = Arc::new(MemoryStore::new());
        let p = pipeline(store.clone());

        let first = p.handle(water(r#"{"flow_lpm":4.0}"#)).await;
        assert!(matches!(
            first,
            Err(PipelineError::Normalize(NormalizationError::MissingField("total_l")))
        ));

        p.handle(water(r#"{"flow_lpm":6.0,"total_l":10.0}"#)).await.unwrap();

        let rows = store.records(Metric::Water);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rate_value, 6.0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let p = pipeline(store.clone());

        let res = p.handle(water(r#"{"flow_lpm":6.0,"total_l":10.0}"#)).await;
        assert!(matches!(res, Err(PipelineError::Store(_))));
    }
}
