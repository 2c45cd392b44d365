//! Controller status reporting for the sync ingestion pipeline

use mesh_control_core::ControllerStatus;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::BrokerSubscription;
use crate::ingest::{IngestResult, IngestionPipeline};

const STATUS_BUFFER: usize = 16;

/// Owns the ingestion pipeline's lifecycle and reports its health
pub struct StatusReporter {
    name: String,
    pipeline: Arc<IngestionPipeline>,
    subscription: Mutex<Option<Box<dyn BrokerSubscription>>>,
    task: Mutex<Option<JoinHandle<IngestResult<()>>>>,
    shutdown: CancellationToken,
}

impl StatusReporter {
    pub fn new(
        name: impl Into<String>,
        pipeline: Arc<IngestionPipeline>,
        subscription: Box<dyn BrokerSubscription>,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline,
            subscription: Mutex::new(Some(subscription)),
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Current status, derived from the pipeline's health
    pub fn get_status(&self) -> ControllerStatus {
        self.pipeline.snapshot().to_controller_status(&self.name)
    }

    /// Start the pipeline unless it is already running.
    ///
    /// Returns whether this call started it.
    pub async fn start(&self) -> bool {
        let Some(mut subscription) = self.subscription.lock().await.take() else {
            return false;
        };

        let pipeline = self.pipeline.clone();
        let shutdown = self.shutdown.child_token();
        let name = self.name.clone();

        let handle = tokio::spawn(async move {
            let result = pipeline.run(subscription.as_mut(), shutdown).await;
            if let Err(e) = &result {
                warn!(controller = %name, error = %e, "Controller stopped");
            }
            result
        });

        *self.task.lock().await = Some(handle);
        info!(controller = %self.name, "Controller started");
        true
    }

    /// Start the pipeline and stream its status transitions.
    ///
    /// The stream opens with the current status and yields a new item on
    /// every change. A terminal `error` status is yielded once and ends the
    /// stream.
    pub async fn stream_status(&self) -> ReceiverStream<ControllerStatus> {
        self.start().await;

        let mut health = self.pipeline.health();
        let (tx, rx) = mpsc::channel(STATUS_BUFFER);
        let name = self.name.clone();

        tokio::spawn(async move {
            let mut last: Option<ControllerStatus> = None;
            loop {
                let current = health.borrow_and_update().to_controller_status(&name);

                if last.as_ref() != Some(&current) {
                    let terminal = current.is_terminal();
                    if tx.send(current.clone()).await.is_err() {
                        debug!(controller = %name, "Status subscriber went away");
                        break;
                    }
                    if terminal {
                        break;
                    }
                    last = Some(current);
                }

                if health.changed().await.is_err() {
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Stop the pipeline and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.lock().await.take() {
            match task.await {
                Ok(Ok(())) => debug!(controller = %self.name, "Controller shut down"),
                Ok(Err(_)) => {}
                Err(e) => warn!(controller = %self.name, error = %e, "Controller task failed"),
            }
        }
    }
}
