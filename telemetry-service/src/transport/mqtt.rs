use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter,
};

use super::{BrokerSession, Connector, TransportError};
use crate::{config::BrokerConfig, pipeline::InboundMessage};

/// Capacity of the request channel between `AsyncClient` and `EventLoop`.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// MQTT 3.1.1 connector. Each `connect` builds a fresh client/event loop pair
/// with a clean session, so nothing queued on a dead connection is replayed.
#[derive(Clone)]
pub struct MqttConnector {
    options: MqttOptions,
}

impl MqttConnector {
    pub fn new(cfg: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
        options.set_clean_session(true);
        Self { options }
    }

    pub fn broker_addr(&self) -> (String, u16) {
        self.options.broker_address()
    }
}

pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

#[async_trait::async_trait]
impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(&self) -> Result<MqttSession, TransportError> {
        let (host, port) = self.broker_addr();
        tracing::info!(%host, port, "connecting to broker");

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CHANNEL_CAPACITY);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(TransportError::Connect(format!(
                            "broker refused connection: {:?}",
                            ack.code
                        )));
                    }
                    return Ok(MqttSession { client, eventloop });
                }
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }
    }
}

#[async_trait::async_trait]
impl BrokerSession for MqttSession {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), TransportError> {
        let filters = topics
            .iter()
            .map(|t| SubscribeFilter::new(t.clone(), QoS::AtMostOnce))
            .collect::<Vec<_>>();
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    async fn next_message(&mut self) -> Result<InboundMessage, TransportError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(InboundMessage::new(publish.topic, publish.payload.to_vec()));
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    tracing::debug!(pkid = ack.pkid, "subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(TransportError::ConnectionLost("broker sent DISCONNECT".to_string()));
                }
                Ok(_) => {}
                Err(e) => return Err(TransportError::ConnectionLost(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicsConfig;

    #[test]
    fn options_follow_broker_config() {
        let cfg = BrokerConfig {
            host: "192.168.87.80".to_string(),
            port: 1883,
            client_id: "ingest-1".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            topics: TopicsConfig::default(),
        };
        let connector = MqttConnector::new(&cfg);

        assert_eq!(connector.broker_addr(), ("192.168.87.80".to_string(), 1883));
        assert_eq!(connector.options.client_id(), "ingest-1");
        assert_eq!(connector.options.keep_alive(), Duration::from_secs(60));
        assert!(connector.options.clean_session());
    }
}
