//! Sync ingestion pipeline
//!
//! A single consumer drains the broker subscription, decodes every message
//! into a [`SyncedObject`] and writes it to the object store. Messages are
//! handled strictly one at a time, so persistence order equals delivery
//! order.
//!
//! Failure handling follows [`FailurePolicy`]:
//!
//! - `halt`: the first decode or persist failure ends the loop
//! - `resume`: undecodable messages are skipped, writes are retried with
//!   backoff and skipped once attempts run out
//!
//! Progress is published as an [`IngestionHealth`] on a watch channel; the
//! status reporter derives controller status from it.

use chrono::{DateTime, Utc};
use mesh_control_core::{ControllerError, ControllerStatus, DecodeError, Status, SyncedObject};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{BrokerMessage, BrokerSubscription, ObjectStore, StoreError};
use crate::config::{FailurePolicy, IngestionSettings};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Errors from the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to decode message on {subject}: {source}")]
    Decode {
        subject: String,
        #[source]
        source: DecodeError,
    },
    #[error("Failed to persist {object}: {source}")]
    Persist {
        object: String,
        #[source]
        source: StoreError,
    },
    #[error("Broker subscription closed")]
    SubscriptionClosed,
}

impl IngestError {
    /// Machine-readable code reported in controller status
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "DECODE_FAILED",
            Self::Persist { .. } => "PERSIST_FAILED",
            Self::SubscriptionClosed => "SUBSCRIPTION_CLOSED",
        }
    }

    fn to_controller_error(&self) -> ControllerError {
        ControllerError {
            code: self.code().to_string(),
            description: self.to_string(),
        }
    }
}

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Lifecycle of the consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    Stopped,
    Failed,
}

/// Counters and last outcome of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct IngestionHealth {
    pub state: PipelineState,
    pub ingested: u64,
    pub skipped: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<ControllerError>,
}

impl IngestionHealth {
    pub fn status(&self) -> Status {
        match self.state {
            PipelineState::Idle | PipelineState::Stopped => Status::Unknown,
            PipelineState::Failed => Status::Error,
            PipelineState::Running if self.consecutive_failures > 0 => Status::Degraded,
            PipelineState::Running => Status::Running,
        }
    }

    /// Controller status for `name`; failure detail is attached while
    /// degraded or failed.
    pub fn to_controller_status(&self, name: &str) -> ControllerStatus {
        let status = ControllerStatus::new(name, self.status());
        match (status.status, &self.last_error) {
            (Status::Degraded | Status::Error, Some(e)) => status.with_error(&e.code, &e.description),
            _ => status,
        }
    }
}

/// The broker-to-store consumer
pub struct IngestionPipeline {
    store: Arc<dyn ObjectStore>,
    policy: FailurePolicy,
    retry: RetryConfig,
    health: watch::Sender<IngestionHealth>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, settings: &IngestionSettings) -> Self {
        let retry = match settings.failure_policy {
            FailurePolicy::Halt => RetryConfig::no_retry(),
            FailurePolicy::Resume => settings.persist_retry.to_retry_config(),
        };
        let (health, _) = watch::channel(IngestionHealth::default());

        Self {
            store,
            policy: settings.failure_policy,
            retry,
            health,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Subscribe to health updates
    pub fn health(&self) -> watch::Receiver<IngestionHealth> {
        self.health.subscribe()
    }

    pub fn snapshot(&self) -> IngestionHealth {
        self.health.borrow().clone()
    }

    /// Consume `subscription` until `shutdown` fires or the pipeline fails.
    ///
    /// Returns `Ok(())` only on shutdown. A closed subscription is a
    /// failure under either policy.
    #[instrument(skip_all, fields(policy = ?self.policy))]
    pub async fn run(
        &self,
        subscription: &mut dyn BrokerSubscription,
        shutdown: CancellationToken,
    ) -> IngestResult<()> {
        self.health.send_modify(|h| h.state = PipelineState::Running);
        info!("Ingestion pipeline started");

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.health.send_modify(|h| h.state = PipelineState::Stopped);
                    info!("Ingestion pipeline stopped");
                    return Ok(());
                }
                message = subscription.next_message() => message,
            };

            let Some(message) = message else {
                return Err(self.fail(IngestError::SubscriptionClosed));
            };

            match self.ingest(message).await {
                Ok(key) => {
                    debug!(object = %key, "Ingested synced object");
                    self.health.send_modify(|h| {
                        h.ingested += 1;
                        h.consecutive_failures = 0;
                        h.last_success = Some(Utc::now());
                    });
                }
                Err(e) => match self.policy {
                    FailurePolicy::Halt => return Err(self.fail(e)),
                    FailurePolicy::Resume => {
                        warn!(code = e.code(), error = %e, "Skipping message");
                        let detail = e.to_controller_error();
                        self.health.send_modify(|h| {
                            h.skipped += 1;
                            h.consecutive_failures += 1;
                            h.last_error = Some(detail);
                        });
                    }
                },
            }
        }
    }

    async fn ingest(&self, message: BrokerMessage) -> IngestResult<String> {
        let object = SyncedObject::decode(&message.payload).map_err(|source| IngestError::Decode {
            subject: message.subject.clone(),
            source,
        })?;
        let key = object.display_key();

        retry_with_backoff(&self.retry, "persist_synced_object", || self.store.create(&object))
            .await
            .map_err(|source| IngestError::Persist {
                object: key.clone(),
                source,
            })?;

        Ok(key)
    }

    fn fail(&self, e: IngestError) -> IngestError {
        error!(code = e.code(), error = %e, "Ingestion pipeline failed");
        let detail = e.to_controller_error();
        self.health.send_modify(|h| {
            h.state = PipelineState::Failed;
            h.consecutive_failures += 1;
            h.last_error = Some(detail);
        });
        e
    }
}
