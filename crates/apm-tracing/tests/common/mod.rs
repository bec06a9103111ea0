//! Shared fixtures for the instrumentation test suites.
//!
//! `FakeRedis` stands in for a real client: it executes commands against an
//! in-memory store, establishes its connection lazily on the first command,
//! and can be told to fail connection setup or instance resolution.

#![allow(dead_code)]

use apm_core::Config;
use apm_tracing::instrument::{
    Command, InstanceInfo, InstanceResolver, ResolutionError, TracedCall,
};
use apm_tracing::redis;
use apm_tracing::span::TraceNode;
use apm_tracing::transaction::Transaction;
use std::collections::HashMap;

pub const REDIS_HOST: &str = "myhost";
pub const REDIS_PORT: &str = "6379";

/// Installs the agent log formatter once for the whole test binary, so
/// instrumentation warnings surface in suite output.
pub fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        apm_core::logger::init(&Config::default()).expect("logger init failed");
    });
}

#[derive(Debug, thiserror::Error)]
pub enum RedisError {
    #[error("Error connecting to Redis")]
    CannotConnect,
}

pub struct FakeRedis {
    store: HashMap<String, String>,
    connected: bool,
    host: String,
    port_path_or_id: String,
    database: String,
    fail_connect: bool,
    fail_resolution: bool,
}

struct Resolver {
    fail: bool,
    info: InstanceInfo,
}

impl InstanceResolver for Resolver {
    fn resolve(&self) -> Result<InstanceInfo, ResolutionError> {
        if self.fail {
            Err(ResolutionError("stubbed path lookup failure".to_string()))
        } else {
            Ok(self.info.clone())
        }
    }
}

impl Default for FakeRedis {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRedis {
    /// A client that has not yet established its connection; the first
    /// command triggers a nested connect.
    pub fn new() -> Self {
        init_logging();
        Self {
            store: HashMap::new(),
            connected: false,
            host: REDIS_HOST.to_string(),
            port_path_or_id: REDIS_PORT.to_string(),
            database: "0".to_string(),
            fail_connect: false,
            fail_resolution: false,
        }
    }

    /// A client whose connection is already up, so commands produce no
    /// connect span.
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::new()
        }
    }

    pub fn with_socket_path(mut self, path: &str) -> Self {
        self.port_path_or_id = path.to_string();
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_resolution(mut self) -> Self {
        self.fail_resolution = true;
        self
    }

    fn resolver(&self) -> Resolver {
        Resolver {
            fail: self.fail_resolution,
            info: InstanceInfo {
                host: self.host.clone(),
                port_path_or_id: self.port_path_or_id.clone(),
                database: Some(self.database.clone()),
            },
        }
    }

    fn ensure_connected(&mut self, call: &mut TracedCall<'_>) -> Result<(), RedisError> {
        if self.connected {
            return Ok(());
        }
        let resolver = self.resolver();
        let fail = self.fail_connect;
        call.connect(Some(&resolver), || {
            if fail {
                Err(RedisError::CannotConnect)
            } else {
                Ok(())
            }
        })?;
        self.connected = true;
        Ok(())
    }

    pub fn get(
        &mut self,
        txn: &mut Transaction,
        config: &Config,
        key: &str,
    ) -> Result<Option<String>, RedisError> {
        let operation = redis::command("get", [key]);
        let resolver = self.resolver();
        redis::trace_operation(txn, config, &operation, Some(&resolver), |call| {
            self.ensure_connected(call)?;
            Ok(self.store.get(key).cloned())
        })
    }

    pub fn set(
        &mut self,
        txn: &mut Transaction,
        config: &Config,
        key: &str,
        value: &str,
    ) -> Result<String, RedisError> {
        let operation = redis::command("set", [key, value]);
        let resolver = self.resolver();
        redis::trace_operation(txn, config, &operation, Some(&resolver), |call| {
            self.ensure_connected(call)?;
            self.store.insert(key.to_string(), value.to_string());
            Ok("OK".to_string())
        })
    }

    pub fn del(
        &mut self,
        txn: &mut Transaction,
        config: &Config,
        keys: &[&str],
    ) -> Result<usize, RedisError> {
        let operation = redis::command("del", keys.iter().map(|key| key.to_string()));
        let resolver = self.resolver();
        redis::trace_operation(txn, config, &operation, Some(&resolver), |call| {
            self.ensure_connected(call)?;
            Ok(keys
                .iter()
                .filter(|key| self.store.remove(**key).is_some())
                .count())
        })
    }

    pub fn pipelined(
        &mut self,
        txn: &mut Transaction,
        config: &Config,
        commands: Vec<Command>,
    ) -> Result<Vec<String>, RedisError> {
        let operation = redis::pipeline(commands.clone());
        let resolver = self.resolver();
        redis::trace_operation(txn, config, &operation, Some(&resolver), |call| {
            self.ensure_connected(call)?;
            Ok(commands.iter().map(|command| self.execute(command)).collect())
        })
    }

    pub fn multi(
        &mut self,
        txn: &mut Transaction,
        config: &Config,
        commands: Vec<Command>,
    ) -> Result<Vec<String>, RedisError> {
        let operation = redis::multi(commands.clone());
        let resolver = self.resolver();
        redis::trace_operation(txn, config, &operation, Some(&resolver), |call| {
            self.ensure_connected(call)?;
            Ok(commands.iter().map(|command| self.execute(command)).collect())
        })
    }

    fn execute(&mut self, command: &Command) -> String {
        match command.name() {
            "set" => {
                if let [key, value] = command.args() {
                    self.store.insert(key.clone(), value.clone());
                }
                "OK".to_string()
            }
            "get" => command
                .args()
                .first()
                .and_then(|key| self.store.get(key))
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Depth-first lookup of a span by name within a finalized trace.
pub fn find_node<'a>(node: &'a TraceNode, name: &str) -> Option<&'a TraceNode> {
    if node.name == name {
        return Some(node);
    }
    node.children.iter().find_map(|child| find_node(child, name))
}
