//! Default values for configuration settings.

use std::path::PathBuf;

use super::settings::{ConfigFile, LoggingSettings};
use crate::job::SchedulerConfig;
use crate::key::Profile;
use crate::logging::{default_log_dir, default_log_file};
use crate::terrain::TerrainSettings;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Name of the config directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".terrastream";

/// Default log level when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(default_log_dir()),
            file: default_log_file().to_string(),
            level: DEFAULT_LOG_LEVEL.to_string(),
            stdout: true,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            terrain: TerrainSettings::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}
