//! Call-count and timing aggregation keyed by `(name, optional scope)`.
//!
//! One `Aggregator` belongs to exactly one execution context (a transaction,
//! or the process-wide store owned by the aggregator service). Recording a
//! scoped metric writes two entries: the `(name, None)` rollup and the
//! `(name, scope)` pairing. The context count is bounded; once the limit is
//! reached, new keys are rejected with an overflow error so a runaway name
//! cardinality cannot grow memory without bound.

use crate::errors::{CreationError, InsertError};
use crate::metric::{MetricData, MetricId};
use fnv::FnvHashMap;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Default bound on distinct metric keys per aggregator.
pub const MAX_METRIC_CONTEXTS: usize = 4096;

/// Accumulates named, scoped call counts and timings.
#[derive(Clone, Debug)]
pub struct Aggregator {
    entries: FnvHashMap<MetricId, MetricData>,
    max_contexts: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            entries: FnvHashMap::default(),
            max_contexts: MAX_METRIC_CONTEXTS,
        }
    }
}

impl Aggregator {
    pub fn new(max_contexts: usize) -> Result<Self, CreationError> {
        if max_contexts == 0 {
            return Err(CreationError::InvalidCapacity);
        }
        Ok(Self {
            entries: FnvHashMap::default(),
            max_contexts,
        })
    }

    /// Records one timed call under `name`, and under `(name, scope)` when a
    /// scope is given.
    pub fn record(
        &mut self,
        name: &str,
        duration: Duration,
        exclusive: Duration,
        scope: Option<&str>,
    ) -> Result<(), InsertError> {
        self.upsert(MetricId::unscoped(name), duration, exclusive)?;
        if let Some(scope) = scope {
            self.upsert(MetricId::scoped(name, scope), duration, exclusive)?;
        }
        Ok(())
    }

    fn upsert(
        &mut self,
        id: MetricId,
        duration: Duration,
        exclusive: Duration,
    ) -> Result<(), InsertError> {
        if let Some(data) = self.entries.get_mut(&id) {
            data.record(duration, exclusive);
            return Ok(());
        }
        if self.entries.len() >= self.max_contexts {
            return Err(InsertError::Overflow(self.max_contexts));
        }
        self.entries
            .insert(id, MetricData::single(duration, exclusive));
        Ok(())
    }

    /// Folds another aggregator into this one.
    ///
    /// Accumulation is commutative, so concurrent contexts may merge in any
    /// order. Entries that would exceed the context bound are dropped with a
    /// warning rather than failing the merge.
    pub fn merge(&mut self, other: Aggregator) {
        let mut dropped = 0;
        for (id, data) in other.entries {
            if let Some(existing) = self.entries.get_mut(&id) {
                existing.merge(&data);
            } else if self.entries.len() < self.max_contexts {
                self.entries.insert(id, data);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(
                "Metric context limit reached ({} contexts), dropped {} merged entries",
                self.max_contexts, dropped
            );
        }
    }

    pub fn get(&self, id: &MetricId) -> Option<&MetricData> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, &MetricData)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Deterministic export of all entries, sorted by name then scope.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut ids: Vec<&MetricId> = self.entries.keys().collect();
        ids.sort();
        let entries = ids
            .into_iter()
            .map(|id| {
                let data = &self.entries[id];
                SnapshotEntry {
                    name: id.name.to_string(),
                    scope: id.scope.map(|s| s.to_string()),
                    call_count: data.call_count,
                    total_time_secs: data.total_time.as_secs_f64(),
                    exclusive_time_secs: data.exclusive_time.as_secs_f64(),
                }
            })
            .collect();
        MetricsSnapshot { entries }
    }
}

/// Point-in-time export of an aggregator's contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str, scope: Option<&str>) -> Option<&SnapshotEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.scope.as_deref() == scope)
    }
}

/// One exported metric entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub scope: Option<String>,
    pub call_count: u64,
    pub total_time_secs: f64,
    pub exclusive_time_secs: f64,
}
