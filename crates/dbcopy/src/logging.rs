//! Process-wide logging context.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host application through [`init`].

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::Result;

/// Initialize logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the configured
/// level. Events go to the configured file (appended, no ANSI colours) or to
/// stderr when no path is set.
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init(config: &LogConfig) -> Result<bool> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match &config.path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
    };

    Ok(installed)
}
