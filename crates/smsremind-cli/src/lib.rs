//! CLI, configuration, SMS delivery and the reminder run
//!
//! This crate provides the `smsremind` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod phone;
pub mod run;
pub mod secret;
pub mod sms;

pub use cli::Cli;
pub use config::{FileConfig, RunConfig, Settings};
pub use error::{ClientError, ClientResult};
pub use phone::{NumberExtractor, PhoneExtractor};
pub use run::{Reminder, RunSummary};
pub use sms::{AspSmsClient, SendError, Sender};
