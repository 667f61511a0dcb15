// 📝 Logging - tracing subscriber setup for the server and CLI
// Text or JSON lines on stderr, filtered by RUST_LOG.

use tracing_subscriber::{fmt, EnvFilter};

/// Human-readable log output.
///
/// `RUST_LOG` wins when set, otherwise `default_level` applies
/// (e.g. "info", "campaign_spend=debug,tower_http=info").
/// Logs go to stderr so stdout stays clean for CLI output.
/// Calling it again is a no-op, which keeps tests happy.
pub fn init_logging(service_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (text)");
}

/// JSON log output, one object per line.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}
