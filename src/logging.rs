//! Diagnostic tracing
//!
//! Diagnostics go to stderr; command results (summaries, `--json`) go to stdout.
//! `RUST_LOG` overrides the level picked from `--verbose`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `warn` by default, `info` when verbose
pub fn init(verbose: bool) {
  let default_level = if verbose { "info" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  // A second init (tests, embedding) keeps the first subscriber
  let _ = tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).compact())
    .try_init();
}
