//! INI configuration file for terrastream tools.
//!
//! The file has one section per concern:
//!
//! ```ini
//! [terrain]      ; TerrainSettings plus the tiling profile
//! [scheduler]    ; job scheduler name and worker count
//! [logging]      ; log directory, file, level, stdout mirroring
//! ```
//!
//! Section structs live in [`settings`](self::settings), constants in
//! `defaults`, parsing in `parser`, and serialization in `writer`.
//!
//! # Example
//!
//! ```
//! use terrastream::config::ConfigFile;
//!
//! let temp = tempfile::TempDir::new().unwrap();
//! let path = temp.path().join("config.ini");
//!
//! let mut config = ConfigFile::default();
//! config.scheduler.workers = 2;
//! config.save_to(&path).unwrap();
//!
//! let loaded = ConfigFile::load_from(&path).unwrap();
//! assert_eq!(loaded.scheduler.workers, 2);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, LoggingSettings};
