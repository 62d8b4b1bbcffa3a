//! Subcommand implementations.

pub mod cache;
pub mod config;
pub mod events;
#[cfg(feature = "google")]
pub mod google;
