//! The reminder run.
//!
//! One run takes the lock, opens the store of sent reminders, fetches the
//! events of the target day and sends at most one SMS per event and lead
//! time. Runs are meant to be started repeatedly by a scheduler; the store
//! makes repeated runs harmless and the lock keeps overlapping runs apart.

use std::io::Write;

use chrono::{DateTime, Utc};
use smsremind_core::{NotificationKey, TimeWindow, target_day};
use smsremind_providers::CalendarProvider;
use smsremind_state::{Lock, Store};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::{ClientError, ClientResult};
use crate::phone::NumberExtractor;
use crate::sms::Sender;

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Another run held the lock; nothing was done.
    pub lock_held: bool,
    /// Events returned by the calendar.
    pub events: usize,
    /// Events without a phone number.
    pub without_number: usize,
    /// Events reminded by an earlier run.
    pub already_sent: usize,
    /// Reminders printed.
    pub reminded: usize,
    /// Reminders sent and recorded.
    pub sent: usize,
}

/// A reminder run wired to its collaborators.
pub struct Reminder<'a> {
    config: &'a RunConfig,
    provider: &'a dyn CalendarProvider,
    sender: &'a dyn Sender,
    extractor: &'a dyn NumberExtractor,
}

impl<'a> Reminder<'a> {
    pub fn new(
        config: &'a RunConfig,
        provider: &'a dyn CalendarProvider,
        sender: &'a dyn Sender,
        extractor: &'a dyn NumberExtractor,
    ) -> Self {
        Self {
            config,
            provider,
            sender,
            extractor,
        }
    }

    /// Runs once, writing one `remind …` line per reminder to `out`.
    pub fn run(&self, out: &mut dyn Write) -> ClientResult<RunSummary> {
        self.run_at(Utc::now(), out)
    }

    /// Same as [`Reminder::run`] with an explicit clock reading.
    pub fn run_at(&self, now: DateTime<Utc>, out: &mut dyn Write) -> ClientResult<RunSummary> {
        let lock = match Lock::acquire_at(&self.config.lock_path, self.config.lock_max_age, now) {
            Ok(lock) => lock,
            Err(e) if e.is_lock_held() => {
                info!(error = %e, "Another run is active, exiting");
                return Ok(RunSummary {
                    lock_held: true,
                    ..RunSummary::default()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let result = self.remind(now, out);

        if let Err(e) = lock.release() {
            warn!(error = %e, "Failed to release lock");
        }
        result
    }

    fn remind(&self, now: DateTime<Utc>, out: &mut dyn Write) -> ClientResult<RunSummary> {
        let config = self.config;
        let store = Store::open(&config.store_path)?;

        let day = target_day(now, config.offset, &config.timezone).ok_or_else(|| {
            ClientError::config(format!("offset of {} days is out of range", config.offset))
        })?;
        let window = TimeWindow::for_day(day, &config.timezone).ok_or_else(|| {
            ClientError::config(format!("{} has no midnight in {}", day, config.timezone))
        })?;

        info!(
            %day,
            provider = self.provider.name(),
            calendars = %config.calendars,
            "Fetching events"
        );
        let events = self.provider.fetch_events(&window, &config.calendars)?;

        let mut summary = RunSummary {
            events: events.len(),
            ..RunSummary::default()
        };

        for event in &events {
            let Some(number) = self.extractor.event_number(event) else {
                debug!(uid = %event.uid, "No phone number, skipping");
                summary.without_number += 1;
                continue;
            };

            let key = NotificationKey::new(event, config.offset);
            if store.exists(&key) {
                debug!(key = %key, "Already sent, skipping");
                summary.already_sent += 1;
                continue;
            }

            let message = config.template.render(&event.localized(&config.timezone));
            writeln!(out, "remind {} {}: {}", event.summary, number, message)?;
            summary.reminded += 1;
            if config.dry_run {
                continue;
            }

            self.sender.send(&number, &message)?;
            store.mark(&key)?;
            info!(key = %key, recipient = %number, "Reminder sent");
            summary.sent += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;
    use std::time::Duration;

    use chrono::DateTime;
    use smsremind_core::{Event, MessageTemplate};
    use smsremind_providers::caldav::Credentials;
    use smsremind_providers::{CalendarFilter, CalendarInfo, ProviderError, ProviderResult};

    use super::*;
    use crate::phone::PhoneExtractor;
    use crate::sms::SendError;

    struct FakeProvider {
        events: Vec<Event>,
        windows: RefCell<Vec<TimeWindow>>,
        fail: bool,
    }

    impl FakeProvider {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events,
                windows: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    impl CalendarProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn list_calendars(&self) -> ProviderResult<Vec<CalendarInfo>> {
            Ok(Vec::new())
        }

        fn fetch_events(
            &self,
            window: &TimeWindow,
            _filter: &CalendarFilter,
        ) -> ProviderResult<Vec<Event>> {
            self.windows.borrow_mut().push(window.clone());
            if self.fail {
                return Err(ProviderError::authentication("401 Unauthorized"));
            }
            Ok(self
                .events
                .iter()
                .filter(|e| window.contains(e.start.to_utc()))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeSender {
        sent: RefCell<Vec<(String, String)>>,
        reject: bool,
    }

    impl Sender for FakeSender {
        fn send(&self, recipient: &str, text: &str) -> Result<(), SendError> {
            if self.reject {
                return Err(SendError::Gateway {
                    code: 3,
                    description: "Invalid Password".to_string(),
                });
            }
            self.sent
                .borrow_mut()
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn config(state_dir: &Path, dry_run: bool) -> RunConfig {
        RunConfig {
            lock_path: state_dir.join("smsremind.lock"),
            store_path: state_dir.join("sent.json"),
            offset: 1,
            calendars: CalendarFilter::all(),
            credentials: Credentials::parse("https://me:pw@caldav.example.com/").unwrap(),
            dry_run,
            template: MessageTemplate::parse(
                "Your next appointment is on {{ .StartDate }} at {{ .StartTime }}",
            )
            .unwrap(),
            sender: "Reminder".to_string(),
            aspsms_userkey: "KEY".to_string(),
            aspsms_password: "PW".to_string(),
            timezone: chrono_tz::Europe::Vienna,
            region: phonenumber::country::Id::AT,
            lock_max_age: Duration::from_secs(60),
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    fn appointment() -> Event {
        let start = DateTime::parse_from_rfc3339("2024-03-01T09:00:00+01:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00").unwrap();
        Event::new("E1", start, end).with_summary("0660 4670967")
    }

    #[test]
    fn sends_once_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let provider = FakeProvider::new(vec![appointment()]);
        let sender = FakeSender::default();
        let extractor = PhoneExtractor::default();
        let reminder = Reminder::new(&config, &provider, &sender, &extractor);
        let now = at("2024-02-29T18:00:00+01:00");

        let mut out = Vec::new();
        let first = reminder.run_at(now, &mut out).unwrap();
        assert_eq!(first.events, 1);
        assert_eq!(first.sent, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "remind 0660 4670967 +436604670967: \
             Your next appointment is on 2024-03-01 at 09:00\n"
        );
        assert_eq!(
            sender.sent.borrow().as_slice(),
            &[(
                "+436604670967".to_string(),
                "Your next appointment is on 2024-03-01 at 09:00".to_string()
            )]
        );

        let store = Store::open(dir.path().join("sent.json")).unwrap();
        assert!(store.exists("E1|2024-03-01T09:00:00+01:00|T-1d"));

        let mut out = Vec::new();
        let second = reminder.run_at(now, &mut out).unwrap();
        assert_eq!(second.already_sent, 1);
        assert_eq!(second.sent, 0);
        assert!(out.is_empty());
        assert_eq!(sender.sent.borrow().len(), 1);

        assert!(!dir.path().join("smsremind.lock").exists());
    }

    #[test]
    fn queries_the_local_target_day() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), true);
        let provider = FakeProvider::new(Vec::new());
        let sender = FakeSender::default();
        let extractor = PhoneExtractor::default();

        // 23:30 UTC is already the next day in Vienna.
        Reminder::new(&config, &provider, &sender, &extractor)
            .run_at(at("2024-02-29T23:30:00Z"), &mut Vec::new())
            .unwrap();

        let windows = provider.windows.borrow();
        assert_eq!(windows[0].start, at("2024-03-02T00:00:00+01:00"));
        assert_eq!(windows[0].end, at("2024-03-03T00:00:00+01:00"));
    }

    #[test]
    fn dry_run_prints_without_sending() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), true);
        let provider = FakeProvider::new(vec![appointment()]);
        let sender = FakeSender::default();
        let extractor = PhoneExtractor::default();
        let reminder = Reminder::new(&config, &provider, &sender, &extractor);
        let now = at("2024-02-29T18:00:00+01:00");

        for _ in 0..2 {
            let mut out = Vec::new();
            let summary = reminder.run_at(now, &mut out).unwrap();
            assert_eq!(summary.reminded, 1);
            assert_eq!(summary.sent, 0);
            assert!(!out.is_empty());
        }
        assert!(sender.sent.borrow().is_empty());
        assert!(!dir.path().join("sent.json").exists());
    }

    #[test]
    fn events_without_number_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let lunch = Event::new("E2", appointment().start, appointment().end).with_summary("Lunch");
        let provider = FakeProvider::new(vec![lunch, appointment()]);
        let sender = FakeSender::default();
        let extractor = PhoneExtractor::default();

        let summary = Reminder::new(&config, &provider, &sender, &extractor)
            .run_at(at("2024-02-29T18:00:00+01:00"), &mut Vec::new())
            .unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.without_number, 1);
        assert_eq!(summary.sent, 1);
    }

    #[test]
    fn held_lock_exits_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let now = at("2024-02-29T18:00:00+01:00");
        let _other = Lock::acquire_at(&config.lock_path, config.lock_max_age, now).unwrap();

        let provider = FakeProvider::new(vec![appointment()]);
        let sender = FakeSender::default();
        let extractor = PhoneExtractor::default();
        let summary = Reminder::new(&config, &provider, &sender, &extractor)
            .run_at(now + chrono::TimeDelta::seconds(10), &mut Vec::new())
            .unwrap();

        assert!(summary.lock_held);
        assert!(provider.windows.borrow().is_empty());
        assert!(sender.sent.borrow().is_empty());
        assert!(config.lock_path.exists());
    }

    #[test]
    fn send_failure_aborts_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let provider = FakeProvider::new(vec![appointment()]);
        let sender = FakeSender {
            reject: true,
            ..FakeSender::default()
        };
        let extractor = PhoneExtractor::default();

        let err = Reminder::new(&config, &provider, &sender, &extractor)
            .run_at(at("2024-02-29T18:00:00+01:00"), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::Send(_)));

        let store = Store::open(&config.store_path).unwrap();
        assert!(store.is_empty());
        assert!(!config.lock_path.exists());
    }

    #[test]
    fn discovery_failure_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let provider = FakeProvider::failing();
        let sender = FakeSender::default();
        let extractor = PhoneExtractor::default();

        let err = Reminder::new(&config, &provider, &sender, &extractor)
            .run_at(at("2024-02-29T18:00:00+01:00"), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::Provider(_)));
        assert!(!config.lock_path.exists());
    }
}
