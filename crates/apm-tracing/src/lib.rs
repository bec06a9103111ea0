//! Transaction trace trees and datastore instrumentation.
//!
//! One [`transaction::Transaction`] owns the span tree for a single logical
//! unit of work (a web request or a background job). Instrumented client
//! operations are described by [`instrument::Operation`] descriptors and
//! wrapped with [`instrument::trace`], which opens a span, runs the call,
//! attributes errors, and feeds the transaction-local metric aggregator
//! using the rollup names in [`naming`]. Finished transactions are handed to
//! [`agent::AgentCore`], which merges their metrics into process-wide
//! storage and buffers their trace trees for export.

pub mod agent;
pub mod grpc;
pub mod instrument;
pub mod naming;
pub mod redis;
pub mod span;
pub mod transaction;

pub use agent::AgentCore;
pub use instrument::{Command, InstanceInfo, InstanceResolver, Operation, ResolutionError};
pub use span::{NoticedError, SpanHandle, TraceNode};
pub use transaction::{
    in_transaction, FinishedTransaction, Transaction, TransactionKind, TransactionTrace,
};
