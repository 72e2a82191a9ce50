//! Tracing subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins over the configured level when it parses.
fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a stderr fmt subscriber. Later calls are ignored.
pub fn init(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(build_env_filter(level))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init("info");
        init("debug");
        tracing::info!("logging initialised");
    }

    #[test]
    fn filter_accepts_config_levels() {
        for level in ["error", "warn", "info", "debug", "trace", "off"] {
            let filter = EnvFilter::new(level);
            assert!(!filter.to_string().is_empty());
        }
    }
}
