use tracing_subscriber::{
    EnvFilter, FmtSubscriber,
    fmt::{format::FmtSpan, time::LocalTime},
};

/// Picks the filter: `RUST_LOG` when set, otherwise `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    pick_filter(EnvFilter::try_from_default_env().ok(), default_level)
}

fn pick_filter(from_env: Option<EnvFilter>, default_level: &str) -> EnvFilter {
    from_env.unwrap_or_else(|| EnvFilter::new(default_level))
}

/// Initialize the logging system with pretty console output.
///
/// `verbose` lowers the default level from `info` to `debug`.
pub fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_level = if verbose { "debug" } else { "info" };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .pretty()
        .with_level(true)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!("Logging system initialized");
    Ok(())
}
