//! Log output
//!
//! One `tracing` subscriber per process. The engine and the sdk log at the
//! configured level; sqlx is held at `warn` because the event recorder
//! writes on every task transition and its statement logs drown everything
//! else at `debug`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives used when `RUST_LOG` is unset
pub fn default_directives(log_level: &str) -> String {
    format!(
        "warn,kestrel_engine={level},kestrel={level},sdk={level},sqlx=warn",
        level = log_level
    )
}

/// Install the subscriber
///
/// `RUST_LOG` overrides `log_level` entirely. Debug builds print
/// human-readable lines; release builds emit one JSON object per event,
/// which is what the adapter process collects.
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn init_telemetry_with_level(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if cfg!(debug_assertions) {
        registry
            .with(fmt::layer().compact().with_target(true))
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init()
            .ok();
    }
}
