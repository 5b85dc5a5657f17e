//! CLI runner for common setup.
//!
//! Loads the config file and initializes logging once, so command handlers
//! start from a ready environment.

use std::path::{Path, PathBuf};

use terrastream::config::{config_file_path, ConfigFile};
use terrastream::logging::{init_logging_with, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Loads configuration and initializes logging.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file, or `None` for `~/.terrastream/config.ini`
    /// * `debug` - Forces the `debug` filter unless `RUST_LOG` is set
    pub fn new(config_path: Option<&Path>, debug: bool) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path);
        let config = ConfigFile::load_from(&config_path)?;

        let mut logging = config.logging.clone();
        if debug {
            logging.level = "debug".to_string();
        }
        let logging_guard =
            init_logging_with(&logging).map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("terrastream v{}", terrastream::VERSION);
        info!(
            config = %self.config_path.display(),
            log = %self.logging_guard.path().display(),
            "terrastream CLI: {} command",
            command
        );
    }
}

/// Explicit path, or the default config location.
pub fn resolve_config_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path)
}
