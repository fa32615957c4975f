use std::error::Error;
use tracing_subscriber::{ fmt::format::FmtSpan, EnvFilter };

/// Exports spans to stderr with their timings when they close.
///
/// Without this, spans still reach the `log` output through tracing's `log`
/// feature, just without timings. The `log` logger itself stays with env_logger.
pub fn enable_span_export() -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber
        ::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
