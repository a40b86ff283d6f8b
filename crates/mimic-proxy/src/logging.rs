//! Tracing subscriber setup.

use crate::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global subscriber. `RUST_LOG` wins over `level`; an invalid
/// `level` falls back to `info`.
pub fn init_tracing(format: LogFormat, level: &str) -> Result<(), anyhow::Error> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    match format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(false).with_span_list(false))
            .try_init()?,
        LogFormat::Console => Registry::default()
            .with(env_filter)
            .with(fmt_layer.with_ansi(true))
            .try_init()?,
    }

    tracing::debug!(format = ?format, "Logging initialized");
    Ok(())
}
