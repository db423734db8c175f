//! Tracing subscriber setup for the `actlink` binary.
//!
//! The library only emits `tracing` events; applications embedding it install
//! their own subscriber or call [`init`].

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `debug`, `actlink=trace`)
pub const LOG_ENV: &str = "ACTLINK_LOG";

/// Install a fmt subscriber writing to stderr.
///
/// `verbose` forces `debug` for this crate when no filter is configured.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "actlink=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
