//! Shared foundation for the trace/metric core: typed configuration,
//! error types, and the log formatter used by the agent binaries.

pub mod config;
pub mod error;
pub mod logger;

pub use config::Config;
pub use error::CoreError;
