//! smsremind CLI entry point.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use smsremind_core::{TracingConfig, init_tracing};
use smsremind_providers::caldav::{CalDavConfig, CalDavProvider};
use tracing::info;

use smsremind_cli::cli::{Cli, Command, ConfigAction, SentAction};
use smsremind_cli::commands;
use smsremind_cli::config::{FileConfig, RunConfig, Settings};
use smsremind_cli::error::ClientResult;
use smsremind_cli::sms::DEFAULT_TIMEOUT;
use smsremind_cli::{AspSmsClient, PhoneExtractor, Reminder};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ClientResult<()> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let settings = Settings::merge(&cli, file);

    init_tracing(TracingConfig::new(settings.debug, settings.log_format))?;

    let mut stdout = io::stdout().lock();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let config = RunConfig::resolve(&settings)?;
            let provider = CalDavProvider::new(CalDavConfig::new(
                config.credentials.clone(),
                config.timezone,
            ))?;
            let sender = AspSmsClient::new(
                config.aspsms_userkey.clone(),
                config.aspsms_password.clone(),
                config.sender.clone(),
                DEFAULT_TIMEOUT,
            )?;
            let extractor = PhoneExtractor::new(config.region);

            let summary =
                Reminder::new(&config, &provider, &sender, &extractor).run(&mut stdout)?;
            info!(
                events = summary.events,
                reminded = summary.reminded,
                sent = summary.sent,
                dry_run = config.dry_run,
                "Run finished"
            );
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&settings, &mut stdout),
            ConfigAction::Validate => commands::config::validate(&settings, &mut stdout),
        },
        Command::Sent { action } => match action {
            SentAction::List => commands::sent::list(&settings, &mut stdout),
            SentAction::Forget { key } => commands::sent::forget(&settings, &key, &mut stdout),
        },
    }
}
