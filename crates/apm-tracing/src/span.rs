//! Span model for transaction trace trees.
//!
//! While a transaction is live its spans are arena-backed
//! ([`SpanNode`] indices inside the transaction); finalization exports them
//! as an owned [`TraceNode`] tree. A span is "open" until its stop offset is
//! set, and children attach only to the innermost open span.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Well-known span attribute keys.
pub mod attributes {
    pub const HOST: &str = "host";
    pub const PORT_PATH_OR_ID: &str = "port_path_or_id";
    pub const DATABASE_NAME: &str = "database_name";
    pub const STATEMENT: &str = "statement";
}

/// An error attributed to a span or transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NoticedError {
    pub class_name: String,
    pub message: String,
}

impl NoticedError {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// Captures a concrete error type. Rust has no runtime class names, so
    /// the type path stands in for one.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        Self {
            class_name: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
        }
    }
}

/// Handle to an open span within its transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanHandle(pub(crate) usize);

/// Live span storage inside a transaction's arena.
#[derive(Debug)]
pub(crate) struct SpanNode {
    pub name: String,
    /// Offset from the transaction start.
    pub started_at: Duration,
    /// Unset while the span is open. `stopped_at >= started_at` once closed.
    pub stopped_at: Option<Duration>,
    pub attributes: HashMap<String, String>,
    pub error: Option<NoticedError>,
    /// Child indices in call order.
    pub children: Vec<usize>,
    /// Sum of direct children's durations, maintained as they close.
    pub child_time: Duration,
}

impl SpanNode {
    pub fn new(name: String, started_at: Duration) -> Self {
        Self {
            name,
            started_at,
            stopped_at: None,
            attributes: HashMap::new(),
            error: None,
            children: Vec::new(),
            child_time: Duration::ZERO,
        }
    }

    pub fn duration(&self) -> Duration {
        self.stopped_at
            .map(|stopped| stopped.saturating_sub(self.started_at))
            .unwrap_or_default()
    }
}

/// One span in a finalized trace tree.
#[derive(Clone, Debug, Serialize)]
pub struct TraceNode {
    pub name: String,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub exclusive: Duration,
    pub attributes: HashMap<String, String>,
    pub error: Option<NoticedError>,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Child by call order.
    ///
    /// # Panics
    ///
    /// Panics when the index is out of range; intended for test navigation.
    pub fn child(&self, index: usize) -> &TraceNode {
        &self.children[index]
    }
}

fn serialize_duration_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
