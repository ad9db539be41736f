//! Tracing subscriber setup and metrics rendering.

use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

/// Initialize console logging.
///
/// Honors `RUST_LOG`; defaults to `info` with the engine at `debug`.
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meridian=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

/// Render a registry in the Prometheus text exposition format, for
/// whatever HTTP surface the operator wires up.
pub fn render_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
