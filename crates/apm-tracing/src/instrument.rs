//! Library-agnostic instrumentation of datastore client calls.
//!
//! An [`Operation`] describes the shape of one instrumented call (connect,
//! single command, pipelined batch, or multi/exec batch). [`trace`] wraps
//! the underlying call: it opens a span before the call runs, records the
//! error on the span when the call fails (the error itself is always
//! re-raised to the caller unchanged), attaches instance attributes, closes
//! the span, and feeds the transaction-local aggregator with the operation,
//! rollup, and instance metrics.
//!
//! Batched operations are recorded as a single span and metric named after
//! the batch, with a composed `statement` attribute. Arguments are redacted
//! as `?` unless argument recording is enabled.

use crate::naming;
use crate::span::{attributes, NoticedError, SpanHandle};
use crate::transaction::Transaction;
use tracing::warn;

/// The shape of an instrumented call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Connect,
    SingleCommand,
    Pipeline,
    Multi,
}

/// One client command with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }

    /// Statement line for this command. Arguments collapse to a single `?`
    /// unless recording is enabled, in which case each renders quoted.
    fn line(&self, record_arguments: bool) -> String {
        if self.args.is_empty() {
            return self.name.clone();
        }
        if record_arguments {
            let rendered: Vec<String> = self.args.iter().map(|arg| format!("\"{}\"", arg)).collect();
            format!("{} {}", self.name, rendered.join(" "))
        } else {
            format!("{} ?", self.name)
        }
    }
}

/// Descriptor for one instrumented datastore call.
#[derive(Clone, Debug)]
pub struct Operation {
    product: String,
    kind: OperationKind,
    commands: Vec<Command>,
}

impl Operation {
    pub fn connect(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            kind: OperationKind::Connect,
            commands: Vec::new(),
        }
    }

    pub fn single(product: impl Into<String>, command: Command) -> Self {
        Self {
            product: product.into(),
            kind: OperationKind::SingleCommand,
            commands: vec![command],
        }
    }

    pub fn pipeline(product: impl Into<String>, commands: Vec<Command>) -> Self {
        Self {
            product: product.into(),
            kind: OperationKind::Pipeline,
            commands,
        }
    }

    pub fn multi(product: impl Into<String>, commands: Vec<Command>) -> Self {
        Self {
            product: product.into(),
            kind: OperationKind::Multi,
            commands,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Operation segment of the metric name: `connect`, the lower-cased
    /// command name, `pipeline`, or `multi`.
    pub fn operation_name(&self) -> String {
        match self.kind {
            OperationKind::Connect => "connect".to_string(),
            OperationKind::SingleCommand => self
                .commands
                .first()
                .map(|command| command.name.to_lowercase())
                .unwrap_or_default(),
            OperationKind::Pipeline => "pipeline".to_string(),
            OperationKind::Multi => "multi".to_string(),
        }
    }

    /// Composed `statement` attribute for the span, if the operation kind
    /// carries one.
    ///
    /// Batch kinds join per-command lines with newlines; `multi` wraps them
    /// in `multi`/`exec` lines. Single commands carry a statement only when
    /// argument recording is enabled; connect never does.
    pub fn statement(&self, record_arguments: bool) -> Option<String> {
        match self.kind {
            OperationKind::Connect => None,
            OperationKind::SingleCommand => {
                if record_arguments {
                    self.commands.first().map(|command| command.line(true))
                } else {
                    None
                }
            }
            OperationKind::Pipeline => Some(self.joined_lines(record_arguments)),
            OperationKind::Multi => Some(format!(
                "multi\n{}\nexec",
                self.joined_lines(record_arguments)
            )),
        }
    }

    fn joined_lines(&self, record_arguments: bool) -> String {
        self.commands
            .iter()
            .map(|command| command.line(record_arguments))
            .collect::<Vec<String>>()
            .join("\n")
    }
}

/// Resolved datastore instance location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceInfo {
    pub host: String,
    /// TCP port or unix socket path, as text.
    pub port_path_or_id: String,
    pub database: Option<String>,
}

/// Failure to obtain instance attributes. Recovered locally; never surfaced
/// to the caller of the instrumented operation.
#[derive(Debug, thiserror::Error)]
#[error("failed to resolve instance information: {0}")]
pub struct ResolutionError(pub String);

/// Lazily resolves the instance an instrumented client talks to. Resolution
/// may itself fail (e.g. it touches a broken connection).
pub trait InstanceResolver {
    fn resolve(&self) -> Result<InstanceInfo, ResolutionError>;
}

/// Sentinel used when instance resolution fails.
pub const UNKNOWN: &str = "unknown";

fn resolve_or_unknown(resolver: &dyn InstanceResolver) -> InstanceInfo {
    match resolver.resolve() {
        Ok(info) => info,
        Err(e) => {
            warn!("instance resolution failed, degrading to unknown: {}", e);
            InstanceInfo {
                host: UNKNOWN.to_string(),
                port_path_or_id: UNKNOWN.to_string(),
                database: None,
            }
        }
    }
}

/// Context handed to the wrapped call, allowing operations observed inside
/// it (a lazily established connection) to nest under the current span.
pub struct TracedCall<'a> {
    txn: &'a mut Transaction,
    product: String,
    record_arguments: bool,
}

impl TracedCall<'_> {
    /// Instruments a lazy connection establishment triggered inside the
    /// current call. The connect span nests under the current command's
    /// span, never beside it.
    pub fn connect<T, E, F>(
        &mut self,
        resolver: Option<&dyn InstanceResolver>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error,
    {
        let operation = Operation::connect(self.product.as_str());
        trace(
            &mut *self.txn,
            &operation,
            self.record_arguments,
            resolver,
            |_call| f(),
        )
    }
}

/// Wraps one instrumented call.
///
/// The span opens before the call executes and closes whether the call
/// succeeds or fails; wrapped-call errors are recorded on the span and then
/// returned to the caller unchanged (timeouts and cancellations included).
/// Instance attributes attach on success, degrading to `unknown` sentinels
/// when resolution fails.
pub fn trace<T, E, F>(
    txn: &mut Transaction,
    operation: &Operation,
    record_arguments: bool,
    resolver: Option<&dyn InstanceResolver>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&mut TracedCall<'_>) -> Result<T, E>,
    E: std::error::Error,
{
    let metric_name =
        naming::datastore_operation(operation.product(), &operation.operation_name());
    let handle = txn.open_span(&metric_name);
    if let Some(statement) = operation.statement(record_arguments) {
        txn.set_attribute(handle, attributes::STATEMENT, statement);
    }

    let mut call = TracedCall {
        txn,
        product: operation.product().to_string(),
        record_arguments,
    };
    let result = f(&mut call);
    let txn = call.txn;

    let mut instance_metric = None;
    match &result {
        Ok(_) => {
            if let Some(resolver) = resolver {
                let info = resolve_or_unknown(resolver);
                apply_instance_attributes(txn, handle, &info);
                instance_metric = Some(naming::datastore_instance(
                    operation.product(),
                    &info.host,
                    &info.port_path_or_id,
                ));
            }
        }
        Err(error) => {
            txn.record_span_error(handle, NoticedError::from_error(error));
        }
    }

    match txn.close_span(handle) {
        Ok(timing) => {
            txn.record_metric(&metric_name, timing.duration, timing.exclusive, true);
            for rollup in naming::datastore_rollups(operation.product(), txn.kind()) {
                txn.record_metric(&rollup, timing.duration, timing.exclusive, false);
            }
            if let Some(instance) = instance_metric {
                txn.record_metric(&instance, timing.duration, timing.exclusive, false);
            }
        }
        Err(e) => {
            // Leaves the trace degraded but never breaks the wrapped call.
            warn!("failed to close span '{}': {}", metric_name, e);
        }
    }

    result
}

fn apply_instance_attributes(txn: &mut Transaction, handle: SpanHandle, info: &InstanceInfo) {
    txn.set_attribute(handle, attributes::HOST, info.host.clone());
    txn.set_attribute(
        handle,
        attributes::PORT_PATH_OR_ID,
        info.port_path_or_id.clone(),
    );
    if let Some(database) = &info.database {
        txn.set_attribute(handle, attributes::DATABASE_NAME, database.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_get() -> Vec<Command> {
        vec![
            Command::with_args("set", ["darkpact", "sorcery"]),
            Command::with_args("get", ["chaos orb"]),
        ]
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::connect("Redis").operation_name(), "connect");
        assert_eq!(
            Operation::single("Redis", Command::new("GET")).operation_name(),
            "get"
        );
        assert_eq!(
            Operation::pipeline("Redis", set_get()).operation_name(),
            "pipeline"
        );
        assert_eq!(Operation::multi("Redis", set_get()).operation_name(), "multi");
    }

    #[test]
    fn test_pipeline_statement_redacts_by_default() {
        let operation = Operation::pipeline("Redis", set_get());
        assert_eq!(
            operation.statement(false).as_deref(),
            Some("set ?\nget ?")
        );
    }

    #[test]
    fn test_multi_statement_wraps_commands() {
        let operation = Operation::multi("Redis", set_get());
        assert_eq!(
            operation.statement(false).as_deref(),
            Some("multi\nset ?\nget ?\nexec")
        );
        assert_eq!(
            operation.statement(true).as_deref(),
            Some("multi\nset \"darkpact\" \"sorcery\"\nget \"chaos orb\"\nexec")
        );
    }

    #[test]
    fn test_single_command_statement_only_with_arguments_enabled() {
        let operation = Operation::single("Redis", Command::with_args("get", ["foo"]));
        assert_eq!(operation.statement(false), None);
        assert_eq!(operation.statement(true).as_deref(), Some("get \"foo\""));
    }

    #[test]
    fn test_connect_has_no_statement() {
        assert_eq!(Operation::connect("Redis").statement(true), None);
    }

    #[test]
    fn test_command_line_without_args() {
        let operation = Operation::multi("Redis", vec![Command::new("discard")]);
        assert_eq!(
            operation.statement(false).as_deref(),
            Some("multi\ndiscard\nexec")
        );
    }
}
