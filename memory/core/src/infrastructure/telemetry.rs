// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process-wide `tracing` subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when set.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::domain::store_config::LoggingConfig;

/// Install the global subscriber. Calling it twice is an error from
/// `tracing_subscriber`, surfaced here as `Err`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_is_rejected() {
        // Only meaningful when RUST_LOG does not override the configured level
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "aegis=loudest".to_string(),
            format: "text".to_string(),
        };
        assert!(init_logging(&config).is_err());
    }
}
