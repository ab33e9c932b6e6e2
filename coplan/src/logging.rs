//! Development-time tracing for debugging planning runs.
//!
//! Search, projection and policy selection emit `debug`/`trace` events per
//! node; summaries are logged at `info`. Nothing here is part of the planner's
//! output, which is returned as values or written through [`crate::io::export`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format. Calling it again after a subscriber has
/// been installed is a no-op, so embedding applications and tests can call it
/// freely.
///
/// # Example
/// ```bash
/// RUST_LOG=coplan=debug cargo test -p coplan
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::debug!("still logging");
    }
}
