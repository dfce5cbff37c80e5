//! Broker connection with an explicit reconnect state machine.
//!
//! ```text
//! RECONNECTING --connect+subscribe ok--> CONNECTED
//! CONNECTED    --transport error------> RECONNECTING (wait fixed delay, retry forever)
//! ```

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;

use crate::pipeline::{Envelope, InboundMessage, MessageHandler, PipelineError};

pub mod mqtt;

pub use mqtt::{MqttConnector, MqttSession};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Opens sessions against one broker.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Session: BrokerSession;

    async fn connect(&self) -> Result<Self::Session, TransportError>;
}

/// One live broker connection.
#[async_trait::async_trait]
pub trait BrokerSession: Send {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), TransportError>;

    /// Wait for the next publish. Any error ends the session.
    async fn next_message(&mut self) -> Result<InboundMessage, TransportError>;
}

/// Fixed delay between reconnect attempts; there is no attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

pub enum ConnectionState<S> {
    Connected(S),
    /// `failures` counts consecutive failed connects, including the drop
    /// that led here; a non-zero count waits one policy delay first.
    Reconnecting { failures: u32 },
}

/// Outcome of one [`TransportClient::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Connected,
    ConnectFailed(TransportError),
    Delivered,
    Disconnected(TransportError),
}

pub struct TransportClient<C: Connector> {
    connector: C,
    policy: ReconnectPolicy,
    topics: Vec<String>,
    handler: Option<Arc<dyn MessageHandler>>,
    state: ConnectionState<C::Session>,
}

impl<C: Connector> TransportClient<C> {
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            topics: Vec::new(),
            handler: None,
            state: ConnectionState::Reconnecting { failures: 0 },
        }
    }

    /// Add topics; they are (re)subscribed on every successful connect.
    pub fn subscribe<I, T>(&mut self, topics: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self.topics.sort();
        self.topics.dedup();
    }

    pub fn on_message(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handler = Some(handler);
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    /// Drive the receive loop for the life of the process.
    pub async fn run_forever(mut self) {
        loop {
            self.step().await;
        }
    }

    /// Advance the state machine by one transition.
    pub async fn step(&mut self) -> Step {
        if let ConnectionState::Connected(session) = &mut self.state {
            let next = session.next_message().await;
            return match next {
                Ok(message) => {
                    dispatch(self.handler.clone(), message).await;
                    Step::Delivered
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = self.policy.delay().as_secs_f64(),
                        "broker connection lost, reconnecting"
                    );
                    self.state = ConnectionState::Reconnecting { failures: 1 };
                    Step::Disconnected(e)
                }
            };
        }

        let failures = match self.state {
            ConnectionState::Reconnecting { failures } => failures,
            ConnectionState::Connected(_) => 0,
        };
        if failures > 0 {
            tokio::time::sleep(self.policy.delay()).await;
        }

        metrics::counter!("transport_reconnect_attempts_total").increment(1);
        match Self::establish(&self.connector, &self.topics).await {
            Ok(session) => {
                tracing::info!(topics = ?self.topics, "connected to broker, listening");
                self.state = ConnectionState::Connected(session);
                Step::Connected
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt = failures + 1,
                    retry_in_secs = self.policy.delay().as_secs_f64(),
                    "broker connect failed, retrying"
                );
                metrics::counter!("transport_reconnect_failures_total").increment(1);
                self.state = ConnectionState::Reconnecting {
                    failures: failures.saturating_add(1),
                };
                Step::ConnectFailed(e)
            }
        }
    }

    // Borrows only the fields it needs: `C::Session` is not required to be
    // `Sync`, so no `&Self` may live across an await.
    async fn establish(connector: &C, topics: &[String]) -> Result<C::Session, TransportError> {
        let mut session = connector.connect().await?;
        if !topics.is_empty() {
            session.subscribe(topics).await?;
        }
        Ok(session)
    }
}

async fn dispatch(handler: Option<Arc<dyn MessageHandler>>, message: InboundMessage) {
    metrics::counter!("transport_messages_total").increment(1);

    let Some(handler) = handler else {
        tracing::debug!(topic = %message.topic, "no handler registered, message discarded");
        return;
    };

    let topic = message.topic.clone();
    let outcome = AssertUnwindSafe(handler.handle(Envelope::now(message)))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(PipelineError::Normalize(e))) => {
            tracing::warn!(error = %e, %topic, "dropping malformed message");
        }
        Ok(Err(e)) => {
            metrics::counter!("transport_handler_failures_total").increment(1);
            tracing::error!(error = %e, %topic, "message handler failed, record lost");
        }
        Err(_) => {
            metrics::counter!("transport_handler_failures_total").increment(1);
            tracing::error!(%topic, "message handler panicked, record lost");
        }
    }
}
