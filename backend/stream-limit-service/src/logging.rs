use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stream_limit_service=debug"));

    let installed = if json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(env_filter).with_target(false).try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
