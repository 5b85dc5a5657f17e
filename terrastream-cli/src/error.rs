//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;
use terrastream::config::ConfigFileError;
use terrastream::terrain::TerrainError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the job scheduler
    Scheduler(std::io::Error),
    /// The terrain engine refused to start
    Terrain(TerrainError),
    /// Failed to write a file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(_) | CliError::Terrain(TerrainError::InvalidSettings { .. }) => {
                eprintln!();
                eprintln!("Check the [terrain] section of your config file.");
                eprintln!("Run 'terrastream config show' to see the effective settings.");
            }
            CliError::Scheduler(_) => {
                eprintln!();
                eprintln!("Try fewer workers, e.g. --workers 2, or 0 for a single thread.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Scheduler(e) => write!(f, "Failed to start job scheduler: {}", e),
            CliError::Terrain(e) => write!(f, "Terrain error: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Scheduler(e) => Some(e),
            CliError::Terrain(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<TerrainError> for CliError {
    fn from(e: TerrainError) -> Self {
        CliError::Terrain(e)
    }
}
