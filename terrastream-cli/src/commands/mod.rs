//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (init, show, path)
//! - [`simulate`] - Headless camera fly-over driving the paging engine

pub mod config;
pub mod simulate;
