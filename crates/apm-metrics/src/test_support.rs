//! Assertion helpers for metric expectations in tests.
//!
//! Consolidating these keeps instrumentation test suites focused on their
//! scenarios instead of re-walking aggregator contents. Two read modes are
//! offered: an inclusive subset check and an exclusive exact-set check for
//! asserting that no extraneous metrics were produced.

use crate::aggregator::Aggregator;
use crate::metric::MetricId;
use regex::Regex;

/// One expected metric: name, optional scope, and call count.
pub type ExpectedMetric<'a> = (&'a str, Option<&'a str>, u64);

fn lookup_failures(aggregator: &Aggregator, expected: &[ExpectedMetric<'_>]) -> Vec<String> {
    let mut failures = Vec::new();
    for (name, scope, call_count) in expected {
        let id = match scope {
            Some(scope) => MetricId::scoped(name, scope),
            None => MetricId::unscoped(name),
        };
        match aggregator.get(&id) {
            Some(data) if data.call_count == *call_count => {}
            Some(data) => failures.push(format!(
                "{:?}: expected call_count {}, got {}",
                id, call_count, data.call_count
            )),
            None => failures.push(format!("{:?}: not recorded", id)),
        }
    }
    failures
}

/// Asserts every expected metric was recorded with the given call count.
/// Extra metrics in the aggregator are allowed (inclusive mode).
///
/// # Panics
///
/// Panics with the list of mismatches if any expectation fails.
pub fn assert_metrics_recorded(aggregator: &Aggregator, expected: &[ExpectedMetric<'_>]) {
    let failures = lookup_failures(aggregator, expected);
    assert!(
        failures.is_empty(),
        "metric expectations failed:\n  {}",
        failures.join("\n  ")
    );
}

/// Asserts the recorded set matches `expected` exactly (exclusive mode),
/// apart from metrics whose name matches one of the `ignore` patterns.
///
/// # Panics
///
/// Panics listing missing, mismatched, and unexpected metrics.
pub fn assert_metrics_recorded_exclusive(
    aggregator: &Aggregator,
    expected: &[ExpectedMetric<'_>],
    ignore: &[&str],
) {
    let ignore: Vec<Regex> = ignore
        .iter()
        .map(|pattern| Regex::new(pattern).expect("invalid ignore pattern"))
        .collect();

    let mut failures = lookup_failures(aggregator, expected);

    for (id, data) in aggregator.iter() {
        if ignore.iter().any(|re| re.is_match(id.name.as_str())) {
            continue;
        }
        let listed = expected.iter().any(|(name, scope, _)| {
            id.name.as_str() == *name && id.scope.map(|s| s.as_str()) == *scope
        });
        if !listed {
            failures.push(format!(
                "{:?}: unexpected metric (call_count {})",
                id, data.call_count
            ));
        }
    }

    assert!(
        failures.is_empty(),
        "exclusive metric expectations failed:\n  {}",
        failures.join("\n  ")
    );
}
