use serde::{Deserialize, Serialize};

use crate::LogLevel;

/// The full release name including the Ember version and SHA.
#[cfg(feature = "init")]
const RELEASE: &str = std::env!("EMBER_RELEASE");

// Import CRATE_NAMES, which lists all crates in the workspace.
#[cfg(feature = "init")]
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  ember::setup > launching ember from config folder .ember
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32Z [ember::setup] INFO: launching ember from config folder .ember
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","message":"launching ember","target":"ember::setup"}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for Ember.
    pub level: LogLevel,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the default filter directives: `INFO` for third-party crates and the configured
/// level for all of Ember's crates.
#[cfg(feature = "init")]
fn default_directives(level: LogLevel) -> String {
    let mut directives = String::from("info");

    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={level}"));
    }

    directives
}

/// Initialize the logging system.
///
/// The `RUST_LOG` environment variable takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// let log_config = ember_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// ember_log::init(&log_config);
/// ```
#[cfg(feature = "init")]
pub fn init(config: &LogConfig) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    if config.enable_backtraces {
        // SAFETY: Logging is initialized on the main thread during startup, before any other
        // threads are spawned that could read the environment concurrently.
        unsafe { std::env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(default_directives(config.level)),
    };

    let subscriber = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let format = match (config.format, console::user_attended_stderr()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            subscriber.compact().with_ansi(true).boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();

    crate::debug!(release = RELEASE, "logging initialized");
}
