//! Centralised tracing initialisation for toolchest binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "TOOLCHEST_LOG";

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines.
/// * `level`: verbosity when neither `TOOLCHEST_LOG` nor `RUST_LOG` is set.
///
/// Logs go to stderr so stdout carries only command output.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
