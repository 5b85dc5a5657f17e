//! Settings structs for each configuration section.

use std::path::PathBuf;

use crate::job::SchedulerConfig;
use crate::key::Profile;
use crate::terrain::TerrainSettings;

/// Complete configuration loaded from `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Tiling scheme, from `[terrain] profile`.
    pub profile: Profile,
    pub terrain: TerrainSettings,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingSettings,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Mirror log output to stdout.
    pub stdout: bool,
}
