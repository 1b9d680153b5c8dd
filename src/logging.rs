//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The filter is taken from, in order:
//! 1. the explicit level passed by the caller (e.g. a `--log-level` flag),
//! 2. the `MACHINE_SCHEDULER_LOG` environment variable (any `EnvFilter`
//!    directive such as `debug` or `machine_scheduler::assigner=trace`),
//! 3. `info`.
//!
//! Output goes to stderr so it never mixes with CLI output on stdout.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MACHINE_SCHEDULER_LOG";

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(level: Option<&str>) {
    let filter = level
        .and_then(|lvl| EnvFilter::try_new(lvl).ok())
        .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
