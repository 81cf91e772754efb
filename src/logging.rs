//! Tracing setup
//!
//! Diagnostics go to stderr so stdout stays reserved for the report.
//! `RUST_LOG` overrides the verbosity flags.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter for a given verbosity
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (true, _) => "colscan=debug",
        (false, true) => "colscan=error",
        (false, false) => "colscan=warn",
    }
}

/// Threads spawned by the tokio runtime
fn is_worker_thread(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with("tokio-runtime-worker"))
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init(verbose: bool, quiet: bool, color: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(color)
            .with_target(verbose),
    );

    if subscriber.try_init().is_err() {
        return false;
    }

    // Scan tasks run on runtime workers; their panics are counted, not shown
    std::panic::set_hook(Box::new(|panic_info| {
        if is_worker_thread(std::thread::current().name()) {
            tracing::debug!(panic = %panic_info, "worker panic");
        } else {
            tracing::error!(panic = %panic_info, "panic");
        }
    }));

    tracing::debug!("tracing initialized");
    true
}
