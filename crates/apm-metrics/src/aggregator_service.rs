//! Process-wide metric storage behind a command channel.
//!
//! Finished transactions each carry their own local [`Aggregator`]; the
//! service serializes merges into the shared store so concurrent contexts
//! never touch the same mutable state. Since merging is commutative, the
//! arrival order of `MergeTransaction` commands does not affect final sums.

use crate::aggregator::{Aggregator, MetricsSnapshot};
use crate::errors::CreationError;
use crate::metric::{MetricData, MetricId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

#[derive(Debug)]
pub enum AggregatorCommand {
    MergeTransaction(Aggregator),
    Flush(oneshot::Sender<MetricsSnapshot>),
    GetEntry {
        id: MetricId,
        response_tx: oneshot::Sender<Option<MetricData>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<AggregatorCommand>,
}

impl AggregatorHandle {
    pub fn merge_transaction(
        &self,
        metrics: Aggregator,
    ) -> Result<(), mpsc::error::SendError<AggregatorCommand>> {
        self.tx.send(AggregatorCommand::MergeTransaction(metrics))
    }

    /// Drains the process-wide store and returns its snapshot.
    pub async fn flush(&self) -> Result<MetricsSnapshot, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(AggregatorCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {}", e))
    }

    pub async fn get_entry(&self, id: MetricId) -> Result<Option<MetricData>, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(AggregatorCommand::GetEntry { id, response_tx })
            .map_err(|e| format!("Failed to send get_entry command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive get_entry response: {}", e))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<AggregatorCommand>> {
        self.tx.send(AggregatorCommand::Shutdown)
    }
}

pub struct AggregatorService {
    aggregator: Aggregator,
    rx: mpsc::UnboundedReceiver<AggregatorCommand>,
}

impl AggregatorService {
    pub fn new(max_contexts: usize) -> Result<(Self, AggregatorHandle), CreationError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = Aggregator::new(max_contexts)?;

        let service = Self { aggregator, rx };

        let handle = AggregatorHandle { tx };

        Ok((service, handle))
    }

    pub async fn run(mut self) {
        debug!("Aggregator service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                AggregatorCommand::MergeTransaction(metrics) => {
                    self.aggregator.merge(metrics);
                }

                AggregatorCommand::Flush(response_tx) => {
                    let snapshot = self.aggregator.snapshot();
                    self.aggregator.clear();

                    if response_tx.send(snapshot).is_err() {
                        error!("Failed to send flush response - receiver dropped");
                    }
                }

                AggregatorCommand::GetEntry { id, response_tx } => {
                    let entry = self.aggregator.get(&id).copied();
                    if response_tx.send(entry).is_err() {
                        error!("Failed to send get_entry response - receiver dropped");
                    }
                }

                AggregatorCommand::Shutdown => {
                    debug!("Aggregator service shutting down");
                    break;
                }
            }
        }

        debug!("Aggregator service stopped");
    }
}
