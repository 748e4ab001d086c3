//! Configuration loading
//!
//! Layers the compiled-in `config/default.toml`, an optional `config/local`
//! file and `CADENCE_` environment variables, later sources winning.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Contents of `config/default.toml`
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Build the [`AppConfig`] from all configuration layers
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false))
        // e.g. CADENCE_RETRY__MAX_BACKOFF_SECS
        .add_source(
            Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.retry.max_concurrent_operations, 3);
        assert_eq!(config.retry.initial_backoff_secs, 15);
        assert!(!config.triggers.paused);
        assert!(config.storage.path.is_none());
    }
}
