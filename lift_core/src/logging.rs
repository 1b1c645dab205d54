//! Tracing setup for the `lift` binary.
//!
//! Stdout belongs to the session itself: prompts, rest countdowns, history
//! tables and export summaries. Diagnostics (skipped log lines, rejected
//! commands, persistence failures) go to stderr so they never interleave with
//! what a user or a script reads from stdout.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Send diagnostics to stderr at `warn`, so a normal session prints nothing
/// beyond its own output. `RUST_LOG=lift_core=debug` shows state transitions
/// and tick handling.
pub fn init() {
    init_with_level("warn")
}

/// Like [`init`], but with `default_level` when `RUST_LOG` is unset or
/// unparsable.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Route engine and runner diagnostics into the test harness output
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
