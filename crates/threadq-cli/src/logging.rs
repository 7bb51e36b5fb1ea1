//! Log output setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives, e.g. `THREADQ_LOG=threadq=debug`
pub const LOG_ENV: &str = "THREADQ_LOG";

/// Install a stderr subscriber filtered by `THREADQ_LOG` (default: info)
pub fn init() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .compact(),
        )
        .init();
}
