//! Configuration commands.

use std::io::Write;

use crate::config::{RunConfig, Settings};
use crate::error::{ClientError, ClientResult};

/// Writes the effective configuration as TOML, secrets redacted.
pub fn dump(settings: &Settings, out: &mut dyn Write) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(&settings.redacted())
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    write!(out, "{}", toml_str)?;
    Ok(())
}

/// Validates the configuration without contacting any server.
pub fn validate(settings: &Settings, out: &mut dyn Write) -> ClientResult<()> {
    let config = RunConfig::resolve(settings)?;
    writeln!(out, "Configuration is valid.")?;
    writeln!(
        out,
        "CalDAV server: {} (account {})",
        config.credentials.base_url(),
        config.credentials.principal()
    )?;
    if config.dry_run {
        writeln!(out, "Dry run: reminders are printed, not sent.")?;
    } else if config.aspsms_userkey.is_empty() || config.aspsms_password.is_empty() {
        return Err(ClientError::config(
            "sending is enabled but the ASPSMS user key or password is missing",
        ));
    }
    Ok(())
}
