//! Logging for the marshaling engine
//!
//! Everything logs through `tracing` with structured fields. Hosts that do
//! not install their own subscriber can call [`init_logging`] or
//! [`init_default_logging`].

pub use tracing::{debug, error, info, trace, warn, Level};

use crate::config::{LogFormatConfig, LoggingConfig};
use crate::status::HResult;
use crate::typelib::Guid;
use std::io;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Compact format for production
    Compact,
    /// JSON format for structured logging
    Json,
}

impl From<LogFormatConfig> for LogFormat {
    fn from(format: LogFormatConfig) -> Self {
        match format {
            LogFormatConfig::Pretty => Self::Pretty,
            LogFormatConfig::Compact => Self::Compact,
            LogFormatConfig::Json => Self::Json,
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// File with daily rotation
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    pub span_events: bool,
    /// Extra filter directives, e.g. "typelib_marshal=trace"
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take format and filter from the `[logging]` config section
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        Self::new()
            .with_format(settings.format.into())
            .with_filter(settings.level.clone())
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Install the global subscriber
///
/// The returned guard flushes buffered output when dropped; keep it alive
/// for as long as logging is needed. Installing twice is a no-op.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config);
    let spans = span_events_config(config.span_events);

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    install(writer, config.format, spans, filter);
    Some(guard)
}

fn install<W>(writer: W, format: LogFormat, spans: FmtSpan, filter: EnvFilter)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer().with_writer(writer).with_span_events(spans);
    let layer = match format {
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
        LogFormat::Json => base.json().with_filter(filter).boxed(),
    };

    // Fails only when a subscriber is already installed
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .fold(base_filter, |filter, directive| {
                filter.add_directive(directive.parse().unwrap_or_else(|_| {
                    warn!("Invalid filter directive: {}", directive);
                    config.level.into()
                }))
            }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Compact stderr logging honoring `RUST_LOG`
///
/// Without `RUST_LOG`, debug builds log this crate at DEBUG and release
/// builds at INFO.
pub fn init_default_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            EnvFilter::new("typelib_marshal=debug")
        }
        #[cfg(not(debug_assertions))]
        {
            EnvFilter::new("typelib_marshal=info")
        }
    });

    fmt::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok();
}

#[inline]
pub fn log_proxy_created(iid: &Guid, name: &str, slots: usize) {
    debug!(target: "proxy", iid = %iid, interface = name, slots, "created proxy");
}

#[inline]
pub fn log_stub_created(iid: &Guid, name: &str, fs: usize) {
    debug!(target: "stub", iid = %iid, interface = name, fs, "created stub");
}

#[inline]
pub fn log_remote_fault(iid: &Guid, method: &str, status: HResult, cause: Option<HResult>) {
    match cause {
        Some(cause) => {
            error!(target: "proxy", iid = %iid, method, %status, %cause, "remote call failed")
        }
        None => error!(target: "proxy", iid = %iid, method, %status, "remote call failed"),
    }
}
