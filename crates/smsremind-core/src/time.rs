//! Time windows for calendar queries.
//!
//! [`TimeWindow`] is the half-open UTC range handed to the calendar backend;
//! [`target_day`] picks the local day a reminder run is looking at.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, or `None` if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Creates a time window covering one local day in the given timezone.
    ///
    /// The window runs from local midnight of `date` to local midnight of the
    /// following day. Returns `None` if either midnight does not exist in
    /// `tz` (a DST gap at midnight).
    pub fn for_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<Self> {
        let start = local_midnight(date, tz)?;
        let end = local_midnight(date.succ_opt()?, tz)?;
        Self::new(start, end)
    }

    /// Checks if a datetime falls within this window.
    ///
    /// Uses half-open interval semantics: `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }
}

/// Returns the local date `offset_days` after the local date of `now` in `tz`.
///
/// Negative offsets look into the past.
pub fn target_day<Tz: TimeZone>(now: DateTime<Utc>, offset_days: i64, tz: &Tz) -> Option<NaiveDate> {
    let today = now.with_timezone(tz).date_naive();
    let days = Days::new(offset_days.unsigned_abs());
    if offset_days >= 0 {
        today.checked_add_days(days)
    } else {
        today.checked_sub_days(days)
    }
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
