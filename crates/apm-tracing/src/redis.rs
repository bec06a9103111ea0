//! Redis flavor of the instrumentation adapter.
//!
//! The only Redis-specific behavior is naming: command names are lower-cased
//! before they become metric segments, and the argument-recording switch
//! comes from `transaction_tracer.record_redis_arguments` (the
//! `record_redis_arguments` config field). Everything else goes through the
//! generic [`crate::instrument`] contract.

use crate::instrument::{trace, Command, InstanceResolver, Operation, TracedCall};
use crate::transaction::Transaction;
use apm_core::Config;

pub const PRODUCT: &str = "Redis";

pub fn connect() -> Operation {
    Operation::connect(PRODUCT)
}

pub fn command<I, S>(name: &str, args: I) -> Operation
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Operation::single(PRODUCT, Command::with_args(name.to_lowercase(), args))
}

pub fn pipeline(commands: Vec<Command>) -> Operation {
    Operation::pipeline(PRODUCT, lowercased(commands))
}

pub fn multi(commands: Vec<Command>) -> Operation {
    Operation::multi(PRODUCT, lowercased(commands))
}

fn lowercased(commands: Vec<Command>) -> Vec<Command> {
    commands
        .into_iter()
        .map(|command| {
            let name = command.name().to_lowercase();
            if name == command.name() {
                command
            } else {
                Command::with_args(name, command.into_args())
            }
        })
        .collect()
}

/// Wraps one Redis client call, honoring the Redis argument-recording
/// configuration.
pub fn trace_operation<T, E, F>(
    txn: &mut Transaction,
    config: &Config,
    operation: &Operation,
    resolver: Option<&dyn InstanceResolver>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&mut TracedCall<'_>) -> Result<T, E>,
    E: std::error::Error,
{
    trace(txn, operation, config.record_redis_arguments, resolver, f)
}
