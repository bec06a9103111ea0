//! Custom tracing formatter for agent logs.
//!
//! Prefixes every log line with `APM_AGENT` so agent output is easy to
//! separate from application logs when both land in the same stream.
//!
//! # Format
//!
//! ```text
//! APM_AGENT | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = apm_core::Config::from_env()?;
//! apm_core::logger::init(&config)?;
//! ```

use crate::config::Config;
use crate::error::CoreError;
use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Installs the agent log formatter as the global subscriber, filtering at
/// the configured level.
pub fn init(config: &Config) -> Result<(), CoreError> {
    let level: tracing::Level = config.log_level.parse().map_err(|_| {
        CoreError::InvalidConfig(format!("Invalid log level '{}'", config.log_level))
    })?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .event_format(Formatter)
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CoreError::Runtime(format!("Failed to install log subscriber: {}", e)))
}

/// Log formatter that prefixes messages with `APM_AGENT`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "APM_AGENT | {} | ", metadata.level())?;

        // Include the full span hierarchy, root first, for nested context.
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Span fields were formatted during `new_span` and stashed in
                // the span's extensions by the fmt layer.
                let ext = span.extensions();
                let fields = &ext
                    .get::<FormattedFields<N>>()
                    .expect("will never be `None`");

                if !fields.is_empty() {
                    write!(writer, "{{{fields}}}")?;
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_events_carry_agent_prefix() {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .event_format(Formatter)
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::INFO)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("agent ready");
        });

        let output = writer.contents();
        assert!(output.starts_with("APM_AGENT | INFO | "), "got: {output}");
        assert!(output.contains("agent ready"));
    }

    #[test]
    fn test_configured_level_filters_events() {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .event_format(Formatter)
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("too quiet");
            tracing::warn!("loud enough");
        });

        let output = writer.contents();
        assert!(!output.contains("too quiet"));
        assert!(output.contains("loud enough"));
    }

    #[test]
    fn test_init_rejects_invalid_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(matches!(init(&config), Err(CoreError::InvalidConfig(_))));
    }
}
