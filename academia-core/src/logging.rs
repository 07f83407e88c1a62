//! Diagnostics for the session layer
//!
//! Everything logs through `tracing`. Events carry user ids, strategy names
//! and session sources as fields; passwords and tokens never appear in them.

use crate::config_error;
use crate::error::AuthResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Subscriber settings, usually the `[logging]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
    /// Record file and line of every event
    pub source_location: bool,
    pub thread_ids: bool,
    /// Append to this file instead of writing to stdout
    pub file: Option<PathBuf>,
    /// Emit a close event, with its duration, for every span
    pub span_timing: bool,
    /// Extra `EnvFilter` directives such as `academia_auth=trace`
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            source_location: false,
            thread_ids: false,
            file: None,
            span_timing: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    fn env_filter(&self) -> AuthResult<EnvFilter> {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        for raw in &self.directives {
            let directive = raw.parse().map_err(|e| {
                config_error!(format!("Invalid log directive {:?}", raw), "init_logging", e)
            })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn writer(&self) -> AuthResult<BoxMakeWriter> {
        match &self.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(BoxMakeWriter::new(std::sync::Mutex::new(file)))
            }
            None => Ok(BoxMakeWriter::new(std::io::stdout)),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Only one subscriber can be installed per process; later calls fail with a
/// configuration error.
pub fn init_logging(config: &LoggingConfig) -> AuthResult<()> {
    let filter = config.env_filter()?;
    let writer = config.writer()?;
    let spans = if config.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_span_events(spans)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_ids(config.thread_ids)
        .with_writer(writer);

    let layer = match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| config_error!("A global subscriber is already installed", "init_logging", e))
}

pub mod performance {
    use std::time::Instant;
    use tracing::Instrument;

    /// Run `future` inside an `auth_op` span and log how long it took
    pub async fn measure_async<F, T>(operation: &str, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let started = Instant::now();
        let output = future
            .instrument(tracing::debug_span!("auth_op", operation = operation))
            .await;

        tracing::debug!(
            target: "academia::timing",
            operation = operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished"
        );
        output
    }
}

/// `debug` event marking the start of a resolver operation
#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "Begin");
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug!(operation = $operation, $($field)*, "Begin");
    };
}

/// `info` event for an operation that changed or confirmed the session
#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr) => {
        tracing::info!(operation = $operation, outcome = "ok");
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info!(operation = $operation, outcome = "ok", $($field)*);
    };
}

/// `warn` event for a failed operation; `$error` is rendered with `Display`
#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr) => {
        tracing::warn!(operation = $operation, outcome = "failed", error = %$error);
    };
    ($operation:expr, $error:expr, $($field:tt)*) => {
        tracing::warn!(operation = $operation, outcome = "failed", error = %$error, $($field)*);
    };
}
