//! Transaction trace trees.
//!
//! A `Transaction` owns the span arena for one logical unit of work and a
//! transaction-local metric aggregator. Span open/close follows strict stack
//! discipline: new spans attach to the innermost open span, and only the
//! innermost open span may close. Exclusive time is maintained incrementally
//! as children close, so a span's metric never double-counts nested work.
//!
//! Transactions are single-context: no locking, no sharing. The only
//! cross-context operation is handing the finished aggregator to the
//! process-wide store (see `apm_metrics::aggregator_service`).

use crate::naming;
use crate::span::{NoticedError, SpanHandle, SpanNode, TraceNode};
use apm_metrics::Aggregator;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The kind of work a transaction represents; selects `allWeb` vs `allOther`
/// rollup names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, derive_more::Display)]
pub enum TransactionKind {
    #[display("web")]
    Web,
    #[display("background")]
    Background,
    #[display("other")]
    Other,
}

/// Span lifecycle violations. None of these are fatal; callers log and move
/// on with degraded traces.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    #[error("the transaction root closes with the transaction")]
    RootSpan,

    #[error("span '{0}' is not the innermost open span")]
    NotInnermost(String),

    #[error("span '{0}' is already closed")]
    AlreadyClosed(String),
}

/// Timing returned when a span closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanTiming {
    pub duration: Duration,
    /// Duration minus the summed durations of direct children.
    pub exclusive: Duration,
}

const ROOT_SPAN_NAME: &str = "ROOT";

/// One logical unit of work and its span tree.
pub struct Transaction {
    name: String,
    kind: TransactionKind,
    started_at: Instant,
    spans: Vec<SpanNode>,
    /// Stack of open span indices; `open[0]` is always the root.
    open: Vec<usize>,
    noticed_errors: Vec<NoticedError>,
    metrics: Aggregator,
}

impl Transaction {
    pub fn new(name: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            started_at: Instant::now(),
            spans: vec![SpanNode::new(ROOT_SPAN_NAME.to_string(), Duration::ZERO)],
            open: vec![0],
            noticed_errors: Vec::new(),
            metrics: Aggregator::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Opens a span as a child of the innermost open span and makes it
    /// current.
    pub fn open_span(&mut self, name: impl Into<String>) -> SpanHandle {
        let started_at = self.elapsed();
        let index = self.spans.len();
        self.spans.push(SpanNode::new(name.into(), started_at));

        let parent = *self.open.last().unwrap_or(&0);
        self.spans[parent].children.push(index);
        self.open.push(index);

        SpanHandle(index)
    }

    pub fn set_attribute(
        &mut self,
        handle: SpanHandle,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.spans[handle.0].attributes.insert(key.into(), value.into());
    }

    /// Attaches an error to a span. A span's error is set at most once;
    /// later errors are dropped.
    pub fn record_span_error(&mut self, handle: SpanHandle, error: NoticedError) {
        let node = &mut self.spans[handle.0];
        if node.error.is_some() {
            debug!(
                "span '{}' already has an error recorded, dropping '{}'",
                node.name, error.class_name
            );
            return;
        }
        node.error = Some(error);
    }

    /// Closes the innermost open span and returns its timing. The parent
    /// becomes current again.
    pub fn close_span(&mut self, handle: SpanHandle) -> Result<SpanTiming, TraceError> {
        if handle.0 == 0 {
            return Err(TraceError::RootSpan);
        }
        if self.spans[handle.0].stopped_at.is_some() {
            return Err(TraceError::AlreadyClosed(self.spans[handle.0].name.clone()));
        }
        if self.open.last() != Some(&handle.0) {
            return Err(TraceError::NotInnermost(self.spans[handle.0].name.clone()));
        }

        self.open.pop();
        Ok(self.stop_span(handle.0))
    }

    fn stop_span(&mut self, index: usize) -> SpanTiming {
        let stopped_at = self.elapsed();
        let node = &mut self.spans[index];
        node.stopped_at = Some(stopped_at);
        let duration = node.duration();
        let exclusive = duration.saturating_sub(node.child_time);

        let parent = *self.open.last().unwrap_or(&0);
        self.spans[parent].child_time += duration;

        SpanTiming {
            duration,
            exclusive,
        }
    }

    /// Records a transaction-level error, distinct from span errors.
    /// Duplicate (class, message) pairs collapse into one entry.
    pub fn notice_error(&mut self, error: NoticedError) {
        if !self.noticed_errors.contains(&error) {
            self.noticed_errors.push(error);
        }
    }

    pub fn noticed_errors(&self) -> &[NoticedError] {
        &self.noticed_errors
    }

    /// Records into the transaction-local aggregator, scoping by the
    /// transaction name when asked. Overflow degrades to a warning.
    pub fn record_metric(
        &mut self,
        name: &str,
        duration: Duration,
        exclusive: Duration,
        scoped: bool,
    ) {
        let scope = if scoped { Some(self.name.clone()) } else { None };
        if let Err(e) = self
            .metrics
            .record(name, duration, exclusive, scope.as_deref())
        {
            warn!("failed to record metric '{}': {}", name, e);
        }
    }

    pub fn metrics(&self) -> &Aggregator {
        &self.metrics
    }

    /// Finalizes the transaction: closes the root (force-closing any spans
    /// the instrumentation left open), records transaction-level metrics,
    /// and exports the span tree.
    pub fn finish(mut self) -> FinishedTransaction {
        while self.open.len() > 1 {
            let index = *self.open.last().expect("open stack checked non-empty");
            warn!(
                "span '{}' left open at transaction end, force-closing",
                self.spans[index].name
            );
            self.open.pop();
            self.stop_span(index);
        }

        self.open.pop();
        let stopped_at = self.elapsed();
        self.spans[0].stopped_at = Some(stopped_at);
        let duration = self.spans[0].duration();
        let root_exclusive = duration.saturating_sub(self.spans[0].child_time);

        let name = self.name.clone();
        self.record_metric(&name, duration, root_exclusive, false);
        let total_time = naming::transaction_total_time(self.kind);
        self.record_metric(total_time, duration, duration, false);
        self.record_metric(&format!("{}/{}", total_time, name), duration, duration, false);
        for caller_rollup in naming::duration_by_caller_unknown(self.kind) {
            self.record_metric(&caller_rollup, duration, duration, false);
        }

        let root = export_node(&self.spans, 0);

        FinishedTransaction {
            trace: TransactionTrace {
                transaction_name: self.name,
                kind: self.kind,
                duration,
                root,
                noticed_errors: self.noticed_errors,
            },
            metrics: self.metrics,
        }
    }
}

fn export_node(spans: &[SpanNode], index: usize) -> TraceNode {
    let node = &spans[index];
    let duration = node.duration();
    TraceNode {
        name: node.name.clone(),
        duration,
        exclusive: duration.saturating_sub(node.child_time),
        attributes: node.attributes.clone(),
        error: node.error.clone(),
        children: node
            .children
            .iter()
            .map(|&child| export_node(spans, child))
            .collect(),
    }
}

/// A finalized transaction: the exportable trace tree plus the
/// transaction-local metrics, ready to merge into process-wide storage.
pub struct FinishedTransaction {
    pub trace: TransactionTrace,
    pub metrics: Aggregator,
}

/// Serializable trace tree for one finalized transaction.
#[derive(Clone, Debug, Serialize)]
pub struct TransactionTrace {
    pub transaction_name: String,
    pub kind: TransactionKind,
    #[serde(skip)]
    pub duration: Duration,
    pub root: TraceNode,
    pub noticed_errors: Vec<NoticedError>,
}

/// Runs one unit of work as a transaction.
///
/// This is the error suppression boundary: an `Err` returned by `f` has, by
/// definition, not been handled inside the transaction and is noticed at the
/// transaction level (spans notice their errors unconditionally as they
/// happen). Errors handled inside `f` never reach the transaction.
pub fn in_transaction<T, E, F>(
    name: &str,
    kind: TransactionKind,
    f: F,
) -> (Result<T, E>, FinishedTransaction)
where
    F: FnOnce(&mut Transaction) -> Result<T, E>,
    E: std::error::Error,
{
    let mut txn = Transaction::new(name, kind);
    let result = f(&mut txn);
    if let Err(error) = &result {
        txn.notice_error(NoticedError::from_error(error));
    }
    (result, txn.finish())
}
