use crate::error::CoreError;
use regex::Regex;
use std::env;

/// Configuration for the trace/metric core.
///
/// All keys are optional in the environment; missing or unparseable values
/// degrade to the documented defaults rather than failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Whether Redis command arguments are recorded in trace statements.
    /// When disabled (the default), arguments are redacted as `?`.
    pub record_redis_arguments: bool,
    /// Host patterns excluded from gRPC instrumentation.
    pub grpc_host_denylist: Vec<Regex>,
    /// Maximum number of finalized transaction traces buffered before the
    /// oldest is evicted.
    pub max_buffered_traces: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            record_redis_arguments: false,
            grpc_host_denylist: Vec::new(),
            max_buffered_traces: 1000,
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, CoreError> {
        let log_level = env::var("APM_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());
        let record_redis_arguments = env::var("APM_RECORD_REDIS_ARGUMENTS")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let grpc_host_denylist = env::var("APM_GRPC_HOST_DENYLIST")
            .map(|val| parse_host_denylist(&val))
            .unwrap_or_default();
        let max_buffered_traces = env::var("APM_MAX_BUFFERED_TRACES")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(1000);

        let config = Self {
            log_level,
            record_redis_arguments,
            grpc_host_denylist,
            max_buffered_traces,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CoreError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(CoreError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.max_buffered_traces == 0 {
            return Err(CoreError::InvalidConfig(
                "APM_MAX_BUFFERED_TRACES must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Replaces the gRPC host denylist with the given raw patterns.
    ///
    /// Convenience for tests and embedders that hold patterns outside the
    /// environment. Invalid patterns are skipped, same as `from_env`.
    pub fn with_grpc_host_denylist(mut self, patterns: &[&str]) -> Self {
        self.grpc_host_denylist = patterns
            .iter()
            .filter_map(|pattern| compile_host_pattern(pattern))
            .collect();
        self
    }
}

/// Parses a comma-separated list of host patterns into compiled regexes.
///
/// Patterns that fail to compile are logged and skipped so that one bad
/// entry cannot disable the remaining denylist.
pub fn parse_host_denylist(raw: &str) -> Vec<Regex> {
    raw.split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .filter_map(compile_host_pattern)
        .collect()
}

fn compile_host_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(
                "Invalid host denylist pattern '{}': {}. Ignoring pattern.",
                pattern,
                e
            );
            None
        }
    }
}
