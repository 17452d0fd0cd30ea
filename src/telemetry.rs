use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a process-wide `tracing` subscriber. Respects `RUST_LOG`;
/// defaults to `info` when unset.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
