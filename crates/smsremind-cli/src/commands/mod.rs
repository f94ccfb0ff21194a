//! Subcommands other than the reminder run.

pub mod config;
pub mod sent;
