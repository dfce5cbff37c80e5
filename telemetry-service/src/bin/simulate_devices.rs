//! Publishes synthetic electric/water/gas readings for one device to the
//! combined topic every two seconds.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::{Map, Value};
use telemetry_client::Metric;
use telemetry_service::{config::AppConfig, observability};

const PUBLISH_EVERY: Duration = Duration::from_secs(2);
const DEVICE_ID: &str = "B1-201";

/// Rate ranges per metric, in the metric's rate unit.
fn rate_range(metric: Metric) -> std::ops::Range<f64> {
    match metric {
        Metric::Electric => 5.0..15.0,
        Metric::Water | Metric::Gas => 5.0..20.0,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Cumulative counters only move forward: each tick adds the consumption
/// implied by the sampled rate over the elapsed time.
struct SimulatedDevice {
    totals: [f64; 3],
}

impl SimulatedDevice {
    fn new<R: Rng>(rng: &mut R) -> Self {
        Self {
            totals: [
                rng.random_range(100.0..600.0),
                rng.random_range(100.0..500.0),
                rng.random_range(500.0..2000.0),
            ],
        }
    }

    fn tick<R: Rng>(&mut self, rng: &mut R, elapsed: Duration, timestamp: i64) -> Vec<Value> {
        let hours = elapsed.as_secs_f64() / 3600.0;
        Metric::ALL
            .iter()
            .zip(self.totals.iter_mut())
            .map(|(&metric, total)| {
                let spec = metric.spec();
                let rate = round2(rng.random_range(rate_range(metric)));
                *total += rate * spec.rate_to_hourly_factor * hours;

                let mut payload = Map::new();
                payload.insert("device".into(), DEVICE_ID.into());
                payload.insert("timestamp".into(), timestamp.into());
                payload.insert("type".into(), metric.as_str().into());
                payload.insert(spec.payload_rate_field.into(), rate.into());
                payload.insert(spec.payload_cumulative_field.into(), round2(*total).into());
                Value::Object(payload)
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let topic = cfg
        .broker
        .topics
        .combined
        .clone()
        .ok_or_else(|| anyhow::anyhow!("broker.topics.combined must be set for the simulator"))?;

    let mut options = MqttOptions::new(
        format!("{}-simulator", cfg.broker.client_id),
        cfg.broker.host.clone(),
        cfg.broker.port,
    );
    options.set_keep_alive(Duration::from_secs(cfg.broker.keep_alive_secs));
    let (client, mut eventloop) = AsyncClient::new(options, 64);

    let reconnect_delay = Duration::from_secs(cfg.broker.reconnect_delay_secs);
    tokio::spawn(async move {
        loop {
            // Polling again after an error reconnects.
            if let Err(e) = eventloop.poll().await {
                tracing::warn!(error = %e, "simulator connection error, retrying");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    });

    let mut device = SimulatedDevice::new(&mut rand::rng());
    let mut ticker = tokio::time::interval(PUBLISH_EVERY);
    tracing::info!(%topic, device = DEVICE_ID, "publishing simulated readings");

    loop {
        ticker.tick().await;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let payloads = device.tick(&mut rand::rng(), PUBLISH_EVERY, now);

        for payload in payloads {
            let body = serde_json::to_vec(&payload)?;
            match client.publish(topic.as_str(), QoS::AtMostOnce, false, body).await {
                Ok(()) => tracing::debug!(%payload, "published"),
                Err(e) => tracing::warn!(error = %e, "publish failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn totals_never_decrease_and_fields_match_metric() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut device = SimulatedDevice::new(&mut rng);
        let mut previous = device.totals;

        for i in 0..50 {
            let payloads = device.tick(&mut rng, PUBLISH_EVERY, 1_717_200_000 + i * 2);
            assert_eq!(payloads.len(), 3);
            for (p, metric) in payloads.iter().zip(Metric::ALL) {
                assert_eq!(p["type"], metric.as_str());
                let rate = p[metric.spec().payload_rate_field].as_f64().unwrap();
                assert!(rate_range(metric).contains(&rate) || rate == rate_range(metric).end);
            }
            assert!(device.totals.iter().zip(previous).all(|(now, before)| *now > before));
            previous = device.totals;
        }
    }
}
