use anyhow::{Context, Result};
use hyperpulse_core::LogConfig;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Initialize the logging system
///
/// Logs go to stderr so stdout stays free for snapshot output.
pub fn init(config: &LogConfig) -> Result<()> {
    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(config.parse_level().into())
        .from_env_lossy();

    let console_layer = if config.console_output {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_target(false)
                .with_filter(filter),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("Logging initialized at level: {}", config.level);
    Ok(())
}
