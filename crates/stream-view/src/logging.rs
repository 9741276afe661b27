//! Tracing setup for hosts embedding a stream view.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ViewConfig;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "stream_view=info,live_playback=info,live_chat=info";

/// Build the filter: `RUST_LOG` first, then `directive`, then the default.
pub fn build_filter(directive: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        directive
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    })
}

/// Install a global fmt subscriber.
///
/// Returns false when a global subscriber was already set, which makes
/// repeated calls harmless.
pub fn init_tracing(directive: Option<&str>) -> bool {
    install(build_filter(directive))
}

/// Install a global fmt subscriber filtered by the view's `log_filter`.
pub fn init_from_config(config: &ViewConfig) -> bool {
    install(build_filter(config.log_filter.as_deref()))
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
