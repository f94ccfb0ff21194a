//! Event types for calendar events.
//!
//! This module provides the types that flow from the calendar backend to the
//! reminder loop:
//! - [`Event`]: A single event occurrence with resolved start/end instants
//! - [`NotificationKey`]: The idempotency key for one reminder of one event

use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};

/// A calendar event with absolute start and end instants.
///
/// Start and end are already resolved to a fixed offset, so all-day and
/// timed events can be compared and formatted the same way. Events are built
/// fresh on every query and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Unique identifier (the iCalendar `UID`).
    pub uid: String,
    /// Start instant.
    pub start: DateTime<FixedOffset>,
    /// End instant.
    pub end: DateTime<FixedOffset>,
    /// Event title.
    pub summary: String,
    /// Event description.
    pub description: String,
    /// Free-form comment.
    pub comment: String,
}

impl Event {
    /// Creates a new event with empty text fields.
    pub fn new(
        uid: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            uid: uid.into(),
            start,
            end,
            summary: String::new(),
            description: String::new(),
            comment: String::new(),
        }
    }

    /// Builder method to set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Returns a copy of this event with start and end expressed in `tz`.
    ///
    /// The instants are unchanged; only the offset used for display moves.
    pub fn localized<Tz: TimeZone>(&self, tz: &Tz) -> Self {
        Self {
            start: self.start.with_timezone(tz).fixed_offset(),
            end: self.end.with_timezone(tz).fixed_offset(),
            ..self.clone()
        }
    }

    /// Start date as `YYYY-MM-DD`.
    pub fn start_date(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// Start time as `HH:MM`.
    pub fn start_time(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    /// End time as `HH:MM`.
    pub fn end_time(&self) -> String {
        self.end.format("%H:%M").to_string()
    }

    /// The text fields searched for contact details, in lookup order.
    pub fn text_fields(&self) -> [&str; 3] {
        [
            self.summary.as_str(),
            self.description.as_str(),
            self.comment.as_str(),
        ]
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut properties = Vec::new();
        if !self.summary.is_empty() {
            properties.push(format!("summary: {}", self.summary));
        }
        if !self.description.is_empty() {
            properties.push(format!("description: {}", self.description));
        }
        if !self.comment.is_empty() {
            properties.push(format!("comment: {}", self.comment));
        }

        write!(
            f,
            "{} {} – {} ({})",
            self.start_date(),
            self.start.format("%-I:%M%p"),
            self.end.format("%-I:%M%p"),
            properties.join(", ")
        )
    }
}

/// Idempotency key for one reminder of one event occurrence.
///
/// Derived from the event UID, the start instant (second precision, RFC 3339)
/// and the lead time in days. The same inputs always produce the same key,
/// across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationKey(String);

impl NotificationKey {
    /// Derives the key for `event` reminded `lead_days` days in advance.
    pub fn new(event: &Event, lead_days: i64) -> Self {
        Self(format!(
            "{}|{}|T-{}d",
            event.uid,
            event.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            lead_days
        ))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NotificationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
