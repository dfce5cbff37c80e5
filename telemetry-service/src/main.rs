use std::{sync::Arc, time::Duration};

use anyhow::Result;
use telemetry_client::{db::PgTelemetryStore, TelemetryStore};
use telemetry_service::{
    api,
    config::AppConfig,
    forecast::{Forecaster, MstlFitter},
    metrics_server,
    normalize::{Normalizer, TopicRoutes},
    observability,
    pipeline::IngestPipeline,
    query::{QueryService, QuerySettings},
    sinks::IngestionWriter,
    transport::{mqtt::MqttConnector, ReconnectPolicy, TransportClient},
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;
    let local = cfg.local_offset()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // Connections are opened per operation; nothing is dialled here.
    let store: Arc<dyn TelemetryStore> = Arc::new(PgTelemetryStore::new(cfg.store.uri.clone()));

    // Write path
    let routes = TopicRoutes::from_config(&cfg.broker.topics);
    let topics = routes.topics();
    let pipeline = IngestPipeline::new(Normalizer::new(routes, local), IngestionWriter::new(store.clone()));

    let connector = MqttConnector::new(&cfg.broker);
    let (host, port) = connector.broker_addr();
    let mut client = TransportClient::new(
        connector,
        ReconnectPolicy::fixed(Duration::from_secs(cfg.broker.reconnect_delay_secs)),
    );
    client.subscribe(topics);
    client.on_message(Arc::new(pipeline));
    tracing::info!(%host, port, topics = ?client.topics(), "starting transport client");
    tokio::spawn(client.run_forever());

    // Read path
    let query = QueryService::new(
        store,
        Forecaster::new(Arc::new(MstlFitter::new(cfg.forecast.confidence))),
        QuerySettings {
            local,
            latest_limit: cfg.api.latest_limit,
            min_samples: cfg.forecast.min_samples,
            max_sample_gap: time::Duration::seconds(cfg.forecast.max_sample_gap_secs),
        },
    );
    api::serve(&cfg.api.bind_addr, Arc::new(query)).await
}
