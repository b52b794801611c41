use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging for the CLI. A no-op if a subscriber is
/// already set, so tests that invoke `Cli::dispatch` more than once don't
/// panic on double-init.
pub fn init() -> Result<()> {
    if tracing::dispatcher::has_been_set() { return Ok(()); }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_line_number(true)
        .with_file(true);

    let error_layer = tracing_error::ErrorLayer::default();

    tracing_subscriber::registry()
        .with(filter)
        .with(error_layer)
        .with(fmt_layer)
        .init();
    Ok(())
}
