//! Loading and saving `~/.terrastream/config.ini`.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// A key holds a value that cannot be used.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Loads from the default path, or returns defaults if it doesn't exist.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`, or returns defaults if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::ReadError`] if the file is not valid INI, and
    /// [`ConfigFileError::InvalidValue`] for the first unusable value.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parses configuration from INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
        super::parser::parse_ini(&ini)
    }

    /// Writes a commented INI file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }
        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// The INI text `save_to` would write.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }
}

/// `~/.terrastream`, or `./.terrastream` without a home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Profile;
    use crate::terrain::DEFAULT_TILE_SIZE;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.profile, Profile::GlobalGeodetic);
        assert_eq!(config.terrain.tile_size, DEFAULT_TILE_SIZE);
        assert!(!config.scheduler.is_manual());
        assert_eq!(config.logging.file, "terrastream.log");
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("a").join("b").join("config.ini");

        ConfigFile::default().save_to(&config_path).unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_config_path_layout() {
        let path = config_file_path();
        assert!(path.ends_with(".terrastream/config.ini"));
    }
}
