use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "companion_memory=info,tower_http=info,warn";

/// Installs the global compact fmt subscriber with RFC 3339 UTC timestamps.
/// Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
