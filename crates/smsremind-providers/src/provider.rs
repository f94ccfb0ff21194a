//! CalendarProvider trait definition.
//!
//! This module defines the [`CalendarProvider`] trait, the seam between the
//! reminder loop and a calendar backend, together with the calendar name
//! filter applied during retrieval.

use std::fmt;
use std::str::FromStr;

use smsremind_core::{Event, TimeWindow};
use url::Url;

use crate::error::ProviderResult;

/// A calendar collection found on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarInfo {
    /// Human-readable name of the calendar, trimmed.
    pub display_name: String,
    /// Absolute URL of the calendar collection.
    pub url: Url,
}

impl CalendarInfo {
    /// Creates a new CalendarInfo.
    pub fn new(display_name: impl Into<String>, url: Url) -> Self {
        Self {
            display_name: display_name.into(),
            url,
        }
    }
}

/// Selects calendars by display name.
///
/// Names match case-insensitively and exactly. An empty filter selects every
/// calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarFilter {
    names: Vec<String>,
}

impl CalendarFilter {
    /// A filter that selects every calendar.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter from a list of names. Blank names are ignored.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Returns true if the calendar called `display_name` is selected.
    pub fn matches(&self, display_name: &str) -> bool {
        self.names.is_empty()
            || self
                .names
                .iter()
                .any(|name| name.to_lowercase() == display_name.to_lowercase())
    }

    /// Returns true if the filter selects every calendar.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the configured names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl FromStr for CalendarFilter {
    type Err = std::convert::Infallible;

    /// Parses a comma separated list such as `"Work, Praxis"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

impl fmt::Display for CalendarFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(","))
    }
}

/// The core abstraction for calendar backends.
///
/// Implementations discover the calendars they can see, select those the
/// filter matches and return every event overlapping the window. Failures
/// to reach a single calendar should be logged and skipped; only failures
/// that prevent discovery are returned as errors.
pub trait CalendarProvider {
    /// Returns the name/type of this provider (e.g. "caldav").
    fn name(&self) -> &str;

    /// Lists the calendars visible to the configured account.
    fn list_calendars(&self) -> ProviderResult<Vec<CalendarInfo>>;

    /// Fetches the events in `window` from the calendars `filter` selects.
    fn fetch_events(
        &self,
        window: &TimeWindow,
        filter: &CalendarFilter,
    ) -> ProviderResult<Vec<Event>>;
}
