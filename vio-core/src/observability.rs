//! Logging infrastructure.
//!
//! Events go to stderr through a `tracing_subscriber` fmt layer; under
//! systemd the journal picks them up.

use crate::error::{Result, VioError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_level` (an `EnvFilter`
/// directive such as `info` or `vio_core=debug`) applies.
///
/// Fails if a global subscriber is already installed or the directive is invalid.
pub fn init(default_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| VioError::InvalidConfig {
            reason: format!("Invalid log level {:?}: {}", default_level, e),
        })?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()
        .map_err(VioError::internal)?;

    tracing::debug!("Observability initialized");
    Ok(())
}
