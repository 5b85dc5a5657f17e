//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show`, and `config path`.

use std::path::Path;

use clap::Subcommand;
use terrastream::config::ConfigFile;

use crate::error::CliError;
use crate::runner::resolve_config_path;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as INI
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(config_path, force),
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Path => run_path(config_path),
    }
}

fn run_init(config_path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = resolve_config_path(config_path);
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = resolve_config_path(config_path);
    let config = ConfigFile::load_from(&path)?;

    if !path.exists() {
        println!("; {} not found, showing defaults", path.display());
    }
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = resolve_config_path(config_path);
    println!("{}", path.display());
    if !path.exists() {
        println!("(file does not exist - run 'terrastream config init' to create it)");
    }
    Ok(())
}
