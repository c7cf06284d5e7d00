use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
///
/// Calling it twice is harmless: the second install is ignored.
///
/// # Returns
///
/// `true` if this call installed the subscriber.
pub fn init_tracing(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    match installed {
        Ok(()) => true,
        Err(e) => {
            // Reaches the subscriber installed earlier.
            debug!(error = %e, "tracing subscriber already installed, keeping it");
            false
        }
    }
}
