//! Diagnostic tracing setup.
//!
//! Tracing output is for operators and goes to stderr. It is separate from
//! the per-session event log, which is product output streamed to clients.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `grwm=info`, or
/// `grwm=debug` with `verbose`. `json` switches to one JSON object per line.
pub fn init(verbose: bool, json: bool) {
    let default_directive = if verbose { "grwm=debug" } else { "grwm=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .init();
    }
}
