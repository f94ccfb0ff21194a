//! Client configuration.
//!
//! Settings come from three layers, highest priority first:
//! 1. command-line flags (or their `SMSREMIND_*` environment variables)
//! 2. an optional TOML file given with `--config`
//! 3. built-in defaults
//!
//! ```toml
//! state_dir = "/var/lib/smsremind"
//! caldav = "pass::icloud/caldav-url"
//! calendars = ["Praxis"]
//! dry_run = false
//! aspsms_userkey = "env::ASPSMS_USERKEY"
//! aspsms_password = "pass::aspsms/api"
//! log_format = "json"
//! ```
//!
//! The merged [`Settings`] are turned into a [`RunConfig`] once at startup.
//! Every value is parsed there, so a bad template or timezone is reported
//! before any lock is taken or server contacted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use phonenumber::country;
use serde::{Deserialize, Serialize};
use smsremind_core::{DEFAULT_TEMPLATE, LogFormat, MessageTemplate};
use smsremind_providers::CalendarFilter;
use smsremind_providers::caldav::Credentials;

use crate::cli::Cli;
use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Lock file name inside the state directory.
pub const LOCK_FILE: &str = "smsremind.lock";

/// Store file name inside the state directory.
pub const STORE_FILE: &str = "sent.json";

const DEFAULT_OFFSET: i64 = 1;
const DEFAULT_SENDER: &str = "Reminder";
const DEFAULT_TIMEZONE: &str = "Europe/Vienna";
const DEFAULT_REGION: &str = "AT";
const DEFAULT_LOCK_MAX_AGE_SECS: u64 = 60;
const REDACTED: &str = "<redacted>";

// ---------------------------------------------------------------------------
// FileConfig (config.toml)
// ---------------------------------------------------------------------------

/// The optional configuration file. Every key mirrors a command-line flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub state_dir: Option<PathBuf>,
    pub offset: Option<i64>,
    pub calendars: Option<Vec<String>>,
    pub caldav: Option<String>,
    pub dry_run: Option<bool>,
    pub sms_template: Option<String>,
    pub sender: Option<String>,
    pub aspsms_userkey: Option<String>,
    pub aspsms_password: Option<String>,
    pub timezone: Option<String>,
    pub region: Option<String>,
    pub lock_max_age_secs: Option<u64>,
    pub debug: Option<bool>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    /// Loads the file at `path`, or an empty configuration if `path` is `None`.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::config(format!("{}: {}", path.display(), e)))
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

// ---------------------------------------------------------------------------
// Settings (flags over file over defaults)
// ---------------------------------------------------------------------------

/// Raw settings after merging all layers, before validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub offset: i64,
    pub calendars: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caldav: Option<String>,
    pub dry_run: bool,
    pub sms_template: String,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspsms_userkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspsms_password: Option<String>,
    pub timezone: String,
    pub region: String,
    pub lock_max_age_secs: u64,
    pub debug: bool,
    pub log_format: LogFormat,
}

impl Settings {
    /// Merges command-line flags over the file configuration.
    pub fn merge(cli: &Cli, file: FileConfig) -> Self {
        let calendars = match &cli.calendars {
            Some(list) => CalendarFilter::new(list.split(',')).names().to_vec(),
            None => CalendarFilter::new(file.calendars.unwrap_or_default())
                .names()
                .to_vec(),
        };

        Self {
            state_dir: cli
                .state_dir
                .clone()
                .or(file.state_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            offset: cli.offset.or(file.offset).unwrap_or(DEFAULT_OFFSET),
            calendars,
            caldav: cli.caldav.clone().or(file.caldav),
            dry_run: cli.dry_run.or(file.dry_run).unwrap_or(true),
            sms_template: cli
                .sms_template
                .clone()
                .or(file.sms_template)
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            sender: cli
                .sender
                .clone()
                .or(file.sender)
                .unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            aspsms_userkey: cli.aspsms_userkey.clone().or(file.aspsms_userkey),
            aspsms_password: cli.aspsms_password.clone().or(file.aspsms_password),
            timezone: cli
                .timezone
                .clone()
                .or(file.timezone)
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            region: cli
                .region
                .clone()
                .or(file.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            lock_max_age_secs: cli
                .lock_max_age_secs
                .or(file.lock_max_age_secs)
                .unwrap_or(DEFAULT_LOCK_MAX_AGE_SECS),
            debug: cli.debug || file.debug.unwrap_or(false),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
        }
    }

    /// Returns a copy safe to print: inline secrets are replaced, secret
    /// references are kept.
    pub fn redacted(&self) -> Self {
        Self {
            caldav: self.caldav.as_deref().map(redact_caldav),
            aspsms_userkey: self.aspsms_userkey.as_deref().map(redact),
            aspsms_password: self.aspsms_password.as_deref().map(redact),
            ..self.clone()
        }
    }

    /// Path of the lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    /// Path of the store of sent reminders.
    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join(STORE_FILE)
    }

    /// How old a lock must be before another run takes it over.
    pub fn lock_max_age(&self) -> Duration {
        Duration::from_secs(self.lock_max_age_secs)
    }
}

fn redact(value: &str) -> String {
    if secret::is_reference(value) {
        value.to_string()
    } else {
        REDACTED.to_string()
    }
}

/// Keeps the server and the account of a CalDAV URL, drops the password.
fn redact_caldav(value: &str) -> String {
    if secret::is_reference(value) {
        return value.to_string();
    }
    match Credentials::parse(value) {
        Ok(credentials) => {
            let mut url = credentials.base_url().clone();
            // `set_username` only fails for URLs that cannot carry credentials.
            if url.set_username(credentials.principal()).is_err() {
                return REDACTED.to_string();
            }
            if credentials.secret().is_some() {
                let _ = url.set_password(Some(REDACTED));
            }
            url.to_string()
        }
        Err(_) => REDACTED.to_string(),
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Fully parsed configuration of a reminder run. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Lock file path.
    pub lock_path: PathBuf,
    /// Store file path.
    pub store_path: PathBuf,
    /// Lead time in days.
    pub offset: i64,
    /// Calendars to query.
    pub calendars: CalendarFilter,
    /// CalDAV server and account.
    pub credentials: Credentials,
    /// Print reminders without sending them.
    pub dry_run: bool,
    /// SMS text.
    pub template: MessageTemplate,
    /// SMS originator.
    pub sender: String,
    /// ASPSMS user key (empty if not configured).
    pub aspsms_userkey: String,
    /// ASPSMS password (empty if not configured).
    pub aspsms_password: String,
    /// Zone for the target day and floating times.
    pub timezone: Tz,
    /// Region for numbers without country code.
    pub region: country::Id,
    /// Age after which a lock is considered stale.
    pub lock_max_age: Duration,
}

impl RunConfig {
    /// Validates `settings` and resolves secret references.
    pub fn resolve(settings: &Settings) -> ClientResult<Self> {
        let template = MessageTemplate::parse(&settings.sms_template)?;
        let timezone = parse_timezone(&settings.timezone)?;
        let region = parse_region(&settings.region)?;

        let caldav = settings
            .caldav
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ClientError::config("no CalDAV URL configured (--caldav)"))?;
        let credentials = Credentials::parse(&secret::resolve(caldav)?)?;

        Ok(Self {
            lock_path: settings.lock_path(),
            store_path: settings.store_path(),
            offset: settings.offset,
            calendars: CalendarFilter::new(&settings.calendars),
            credentials,
            dry_run: settings.dry_run,
            template,
            sender: settings.sender.clone(),
            aspsms_userkey: resolve_optional(settings.aspsms_userkey.as_deref())?,
            aspsms_password: resolve_optional(settings.aspsms_password.as_deref())?,
            timezone,
            region,
            lock_max_age: settings.lock_max_age(),
        })
    }
}

fn resolve_optional(value: Option<&str>) -> ClientResult<String> {
    value.map(secret::resolve).transpose().map(Option::unwrap_or_default)
}

/// Parses an IANA timezone name such as `Europe/Vienna`.
pub fn parse_timezone(name: &str) -> ClientResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| ClientError::config(format!("unknown timezone {:?}: {}", name, e)))
}

/// Parses a two-letter region code such as `AT`.
pub fn parse_region(code: &str) -> ClientResult<country::Id> {
    code.trim()
        .to_ascii_uppercase()
        .parse::<country::Id>()
        .map_err(|_| ClientError::Phone(code.to_string()))
}
