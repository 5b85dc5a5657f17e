//! terrastream CLI - Command-line interface
//!
//! This binary drives the terrastream paging engine headlessly.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "terrastream")]
#[command(version = terrastream::VERSION)]
#[command(about = "Quadtree terrain tile paging engine", long_about = None)]
struct Cli {
    /// Config file (default: ~/.terrastream/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fly a camera over procedural terrain and report paging activity
    Simulate {
        #[command(flatten)]
        args: SimulateArgs,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate { args, debug } => run_simulate(args, cli.config, debug).await,
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    };

    if let Err(e) = result {
        e.exit();
    }
}

async fn run_simulate(
    args: SimulateArgs,
    config: Option<PathBuf>,
    debug: bool,
) -> Result<(), CliError> {
    let runner = CliRunner::new(config.as_deref(), debug)?;
    commands::simulate::run(args, &runner).await
}
