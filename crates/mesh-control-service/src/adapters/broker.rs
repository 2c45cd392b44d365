//! Broker subscription adapter
//!
//! The ingestion pipeline reads from a [`BrokerSubscription`]. Production
//! deployments use a NATS queue subscription; [`ChannelSubscription`] feeds
//! messages from an in-process channel.

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument};

/// Errors from establishing a broker subscription
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("Failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },
}

/// One message as delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }
}

/// An inbound stream of broker messages
#[async_trait]
pub trait BrokerSubscription: Send {
    /// Next message, or `None` once the subscription is closed.
    async fn next_message(&mut self) -> Option<BrokerMessage>;
}

/// NATS queue subscription
pub struct NatsSubscription {
    subscriber: async_nats::Subscriber,
}

impl NatsSubscription {
    /// Connect to `url` and join `queue_group` on `subject`.
    #[instrument]
    pub async fn connect(url: &str, subject: &str, queue_group: &str) -> Result<Self, BrokerError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let subscriber = client
            .queue_subscribe(subject.to_string(), queue_group.to_string())
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        info!(%url, %subject, %queue_group, "Subscribed to broker");

        Ok(Self { subscriber })
    }
}

#[async_trait]
impl BrokerSubscription for NatsSubscription {
    async fn next_message(&mut self) -> Option<BrokerMessage> {
        self.subscriber.next().await.map(|message| BrokerMessage {
            subject: message.subject.to_string(),
            payload: message.payload.to_vec(),
        })
    }
}

/// Subscription fed from an in-process channel
#[derive(Debug)]
pub struct ChannelSubscription {
    rx: mpsc::Receiver<BrokerMessage>,
}

impl ChannelSubscription {
    /// Create a subscription and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<BrokerMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl BrokerSubscription for ChannelSubscription {
    async fn next_message(&mut self) -> Option<BrokerMessage> {
        self.rx.recv().await
    }
}
