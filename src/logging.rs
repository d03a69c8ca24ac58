//! Tracing setup for hosts embedding the engine.
//!
//! The engine itself only emits `tracing` events; hosts decide where they go.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Maps a verbosity count to a level name (0=error .. 4+=trace).
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Install a stderr text subscriber. `RUST_LOG` overrides the verbosity.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cabinet_queue={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(verbosity >= 3)
                .with_line_number(verbosity >= 3),
        )
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Initialize logging for tests; repeated calls are ignored.
pub fn init_test_logging() {
    let _ = init_logging(3);
}
