//! CLI, configuration, secret resolution and output rendering
//!
//! This crate provides the `edusis` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod secret;
pub mod session;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
