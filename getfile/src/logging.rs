//! Logging setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber logging to stderr.
///
/// `verbosity` raises the default `info` level (1 = debug, 2+ = trace); `RUST_LOG` overrides it entirely.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("getfile={level},gfserver={level},gfclient={level}")));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_thread_names(true).init();
}
