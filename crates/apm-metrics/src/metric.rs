use std::time::Duration;
use ustr::Ustr;

/// Key identifying one aggregated metric: a name plus an optional scope.
///
/// The scope, when present, is the name of the transaction the metric was
/// recorded under. Scoped and unscoped entries for the same name are
/// independent aggregation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    pub name: Ustr,
    pub scope: Option<Ustr>,
}

impl MetricId {
    pub fn unscoped(name: &str) -> Self {
        Self {
            name: Ustr::from(name),
            scope: None,
        }
    }

    pub fn scoped(name: &str, scope: &str) -> Self {
        Self {
            name: Ustr::from(name),
            scope: Some(Ustr::from(scope)),
        }
    }
}

/// Aggregated value for one metric key.
///
/// `exclusive_time` is the portion of `total_time` not attributable to
/// nested instrumented operations; callers compute it at span close and the
/// aggregator only accumulates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricData {
    pub call_count: u64,
    pub total_time: Duration,
    pub exclusive_time: Duration,
}

impl MetricData {
    /// A single call's worth of data.
    pub fn single(duration: Duration, exclusive: Duration) -> Self {
        Self {
            call_count: 1,
            total_time: duration,
            exclusive_time: exclusive,
        }
    }

    /// Accumulates one call into this entry.
    pub fn record(&mut self, duration: Duration, exclusive: Duration) {
        self.call_count += 1;
        self.total_time += duration;
        self.exclusive_time += exclusive;
    }

    /// Folds another entry into this one. Addition on every field, so merge
    /// order never changes the result.
    pub fn merge(&mut self, other: &MetricData) {
        self.call_count += other.call_count;
        self.total_time += other.total_time;
        self.exclusive_time += other.exclusive_time;
    }
}
