use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogLevel;

/// `RUST_LOG` wins when set; otherwise the configured level applies.
fn directive(level: LogLevel, rust_log: Option<String>) -> String {
    rust_log
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or_else(|| level.filter_directive().to_string())
}

/// JSON logs on stderr. stdout carries the protocol and must stay clean.
pub fn init(level: LogLevel) {
    let directive = directive(level, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .try_init();
}
