//! Logging setup.
//!
//! Everything is written to **stderr**: stdout carries the handshake line the
//! host reads to find the gRPC address.
//!
//! `RUST_LOG` controls filtering and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=embracecloud_provider=debug ./embracecloud-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install the stderr subscriber.
///
/// Returns false if a global subscriber was already set, in which case the
/// existing one stays in place.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .is_ok()
}

/// Install the stderr subscriber, keeping any subscriber that is already set.
pub fn init_logging() {
    if !try_init_logging() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new(DEFAULT_LEVEL).is_ok());
        assert!(EnvFilter::try_new("embracecloud_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,embracecloud_provider::keycloak=trace").is_ok());
    }

    #[test]
    fn test_second_init_is_refused() {
        init_logging();
        assert!(!try_init_logging());
    }
}
