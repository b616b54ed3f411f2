//! Tracing initialization.
//!
//! Sets up tracing-subscriber with console output and an `RUST_LOG`-driven
//! env filter. Kept separate from `main` so tests and embedding front ends
//! can initialize the same stack.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing. Safe to call once per process; a second call reports
/// an error from `try_init` which callers may ignore in tests.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
