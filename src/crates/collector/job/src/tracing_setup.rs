//! Tracing initialization for collector plugins.
//!
//! Logs go to the systemd journal when the agent announces one through
//! `NETDATA_SYSTEMD_JOURNAL_PATH`, and to stderr otherwise. Stdout is reserved
//! for the plugin protocol.

use tracing_subscriber::{EnvFilter, prelude::*};

/// Environment variable set by the agent when journal logging is configured
pub const JOURNAL_PATH_ENV: &str = "NETDATA_SYSTEMD_JOURNAL_PATH";

/// Output destination for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Journal,
    Stderr,
}

impl LogOutput {
    pub fn detect() -> Self {
        Self::from_journal_path(std::env::var_os(JOURNAL_PATH_ENV).as_deref())
    }

    fn from_journal_path(path: Option<&std::ffi::OsStr>) -> Self {
        match path {
            Some(path) if !path.is_empty() => LogOutput::Journal,
            _ => LogOutput::Stderr,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            LogOutput::Journal => "systemd journal",
            LogOutput::Stderr => "stderr",
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter`. If the journal cannot be reached,
/// logging falls back to stderr. Calling this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let mut output = LogOutput::detect();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let journald_layer = match output {
        LogOutput::Journal => match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(err) => {
                eprintln!("failed to connect to journald, logging to stderr: {err}");
                output = LogOutput::Stderr;
                None
            }
        },
        LogOutput::Stderr => None,
    };

    let result = match journald_layer {
        Some(layer) => registry.with(layer).try_init(),
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_ansi(false);
            registry.with(fmt_layer).try_init()
        }
    };

    if result.is_err() {
        return;
    }

    tracing::info!(
        output = ?output,
        "tracing initialized, logging to {} with filter '{}'",
        output.description(),
        default_filter,
    );
}
