//! Process-wide glue: merges finished transactions into shared metric
//! storage and buffers finalized trace trees for export.
//!
//! The trace buffer is a bounded FIFO; when it fills, the oldest trace is
//! evicted with a warning so memory stays bounded under load.

use crate::transaction::{
    in_transaction, FinishedTransaction, Transaction, TransactionKind, TransactionTrace,
};
use apm_core::Config;
use apm_metrics::aggregator::MAX_METRIC_CONTEXTS;
use apm_metrics::errors::CreationError;
use apm_metrics::{AggregatorHandle, AggregatorService, MetricsSnapshot};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

/// Shared entry point for recording transactions.
///
/// Cloned handles may be used from any number of concurrent contexts; metric
/// merging is serialized by the aggregator service and commutative, so
/// completion order never changes final counts.
#[derive(Clone)]
pub struct AgentCore {
    config: Arc<Config>,
    metrics: AggregatorHandle,
    traces: Arc<Mutex<VecDeque<TransactionTrace>>>,
}

impl AgentCore {
    /// Builds the agent core and its aggregator service. The caller spawns
    /// `service.run()` on its runtime.
    pub fn new(config: Arc<Config>) -> Result<(Self, AggregatorService), CreationError> {
        let (service, metrics) = AggregatorService::new(MAX_METRIC_CONTEXTS)?;
        let core = Self {
            config,
            metrics,
            traces: Arc::new(Mutex::new(VecDeque::new())),
        };
        Ok((core, service))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one unit of work as a transaction and submits the result.
    /// See [`in_transaction`] for the error suppression boundary.
    pub fn transaction<T, E, F>(&self, name: &str, kind: TransactionKind, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
        E: std::error::Error,
    {
        let (result, finished) = in_transaction(name, kind, f);
        self.submit(finished);
        result
    }

    /// Hands a finished transaction to reporting: metrics merge into the
    /// process-wide store, the trace joins the bounded buffer.
    pub fn submit(&self, finished: FinishedTransaction) {
        if let Err(e) = self.metrics.merge_transaction(finished.metrics) {
            error!("failed to merge transaction metrics: {}", e);
        }

        let mut traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        if traces.len() >= self.config.max_buffered_traces {
            if let Some(evicted) = traces.pop_front() {
                warn!(
                    "Trace buffer full ({} traces), dropping oldest trace '{}'",
                    self.config.max_buffered_traces, evicted.transaction_name
                );
            }
        }
        traces.push_back(finished.trace);
    }

    /// Drains the process-wide metric store.
    pub async fn flush_metrics(&self) -> Result<MetricsSnapshot, String> {
        self.metrics.flush().await
    }

    /// The most recently finalized transaction trace, if any.
    pub fn last_trace(&self) -> Option<TransactionTrace> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Removes and returns all buffered traces, oldest first.
    pub fn take_traces(&self) -> Vec<TransactionTrace> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.metrics.shutdown() {
            error!("failed to shut down aggregator service: {}", e);
        }
    }
}
