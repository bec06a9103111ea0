//! Metric aggregation for the trace core.
//!
//! Timed operations are rolled up by `(name, optional scope)` into call
//! counts, total time, and exclusive time. Each execution context records
//! into its own [`aggregator::Aggregator`]; finished contexts are merged
//! into process-wide storage through the [`aggregator_service`] actor, the
//! only cross-context shared-mutable-state path. Merging is commutative, so
//! the order in which concurrent contexts land never changes final sums.

pub mod aggregator;
pub mod aggregator_service;
pub mod errors;
pub mod metric;
pub mod test_support;

pub use aggregator::{Aggregator, MetricsSnapshot};
pub use aggregator_service::{AggregatorHandle, AggregatorService};
pub use metric::{MetricData, MetricId};
