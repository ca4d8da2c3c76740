use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INITED: OnceLock<()> = OnceLock::new();

fn env_filter() -> EnvFilter {
    // Default to info if RUST_LOG unset
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber exactly once.
///
/// RUST_LOG selects the filter, e.g. "pool_indexer=debug,sqlx=warn".
pub fn init() {
    if INITED.get().is_some() {
        return;
    }

    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init();

    if result.is_ok() {
        let _ = INITED.set(());
    }
}
