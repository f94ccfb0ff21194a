//! ICS/iCalendar parsing utilities.
//!
//! This module parses iCalendar (RFC 5545) data returned by calendar-query
//! reports and converts VEVENT components to [`Event`]s.
//!
//! Date values are resolved in this order:
//! - `VALUE=DATE` or a bare `YYYYMMDD`: local midnight in the default zone
//! - a trailing `Z`: UTC, any `TZID` is ignored
//! - a known `TZID`: that zone, otherwise the default zone

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, Component, Property, parser::unfold};
use smsremind_core::Event;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// UID used for events that have none.
pub const MISSING_UID: &str = "(missing-uid)";

/// Stands in for an escaped backslash while the parser decodes TEXT values.
/// The parser replaces `\\` before `\n`, so `\\n` would otherwise come out
/// as a line break.
const ESCAPED_BACKSLASH: char = '\u{E000}';

/// A resolved DTSTART/DTEND value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    /// The absolute instant.
    pub instant: DateTime<FixedOffset>,
    /// True for date-only values.
    pub whole_day: bool,
}

/// Parses a `calendar-data` blob into events.
///
/// The blob may hold several VCALENDAR objects. Any unparseable object or
/// date value fails the whole blob.
pub fn parse_calendar_data(blob: &str, default_tz: &Tz) -> ProviderResult<Vec<Event>> {
    let objects = split_calendars(blob);
    if objects.is_empty() {
        return Err(ProviderError::parse("no VCALENDAR object in calendar data"));
    }

    let mut events = Vec::new();
    for object in objects {
        let calendar = unfold(&object)
            .replace(r"\\", &ESCAPED_BACKSLASH.to_string())
            .parse::<Calendar>()
            .map_err(|e| ProviderError::parse(format!("invalid iCalendar data: {}", e)))?;

        for component in calendar.iter() {
            if let CalendarComponent::Event(event) = component
                && let Some(event) = parse_event(event, default_tz)?
            {
                events.push(event);
            }
        }
    }

    Ok(events)
}

/// Splits a blob into its `BEGIN:VCALENDAR` .. `END:VCALENDAR` objects.
///
/// Lines are re-joined with CRLF so folded lines unfold correctly.
fn split_calendars(blob: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in blob.lines() {
        let marker = line.trim();
        if marker.eq_ignore_ascii_case("BEGIN:VCALENDAR") {
            current = Some(vec![marker]);
        } else if let Some(lines) = &mut current {
            if marker.eq_ignore_ascii_case("END:VCALENDAR") {
                lines.push(marker);
                let mut object = lines.join("\r\n");
                object.push_str("\r\n");
                objects.push(object);
                current = None;
            } else {
                lines.push(line);
            }
        }
    }

    objects
}

/// Converts one VEVENT. Returns `None` for events without DTSTART.
fn parse_event(event: &icalendar::Event, default_tz: &Tz) -> ProviderResult<Option<Event>> {
    let uid = text_value(event, "UID")
        .filter(|uid| !uid.is_empty())
        .unwrap_or_else(|| MISSING_UID.to_string());

    let Some(dtstart) = event.properties().get("DTSTART") else {
        debug!(uid = %uid, "Skipping event without DTSTART");
        return Ok(None);
    };
    let start = resolve_property(dtstart, default_tz)
        .map_err(|e| e.context(format!("DTSTART of {}", uid)))?;

    let end = match event.properties().get("DTEND") {
        Some(dtend) => {
            resolve_property(dtend, default_tz)
                .map_err(|e| e.context(format!("DTEND of {}", uid)))?
                .instant
        }
        None if start.whole_day => start.instant + TimeDelta::hours(24),
        None => start.instant,
    };

    let parsed = Event::new(uid, start.instant, end)
        .with_summary(text_value(event, "SUMMARY").unwrap_or_default())
        .with_description(text_value(event, "DESCRIPTION").unwrap_or_default())
        .with_comment(comment(event).unwrap_or_default());

    debug!(uid = %parsed.uid, start = %parsed.start, "Parsed event from ICS");
    Ok(Some(parsed))
}

fn text_value(event: &icalendar::Event, name: &str) -> Option<String> {
    event.property_value(name).map(restore_text)
}

/// COMMENT may repeat, so the parser files it with the multi-properties.
/// The first occurrence is used.
fn comment(event: &icalendar::Event) -> Option<String> {
    event
        .multi_properties()
        .get("COMMENT")
        .and_then(|values| values.first())
        .map(|property| restore_text(property.value()))
}

fn restore_text(value: &str) -> String {
    value.trim().replace(ESCAPED_BACKSLASH, "\\")
}

fn resolve_property(property: &Property, default_tz: &Tz) -> ProviderResult<ResolvedTime> {
    parse_ical_datetime(
        property.value(),
        param(property, "VALUE"),
        param(property, "TZID"),
        default_tz,
    )
}

fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property
        .params()
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, param)| param.value().trim())
        .filter(|value| !value.is_empty())
}

/// Resolves an iCalendar date or date-time value.
///
/// Handles:
/// - `20240115` or `VALUE=DATE` (whole day, local midnight in `default_tz`)
/// - `20240115T090000Z`, `20240115T0900Z` (UTC)
/// - `20240115T090000`, `20240115T0900` (in `tzid` if known, else `default_tz`)
pub fn parse_ical_datetime(
    value: &str,
    value_type: Option<&str>,
    tzid: Option<&str>,
    default_tz: &Tz,
) -> ProviderResult<ResolvedTime> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProviderError::parse("empty datetime"));
    }

    let is_date = value_type.is_some_and(|t| t.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && !value.contains('T'));
    if is_date {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|e| ProviderError::parse(format!("invalid date {:?}: {}", value, e)))?;
        let instant = localize(default_tz, date.and_time(NaiveTime::MIN), value)?;
        return Ok(ResolvedTime {
            instant,
            whole_day: true,
        });
    }

    if value.ends_with('Z') {
        let naive = ["%Y%m%dT%H%M%SZ", "%Y%m%dT%H%MZ"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .ok_or_else(|| {
                ProviderError::parse(format!("unsupported UTC datetime {:?}", value))
            })?;
        return Ok(ResolvedTime {
            instant: Utc.from_utc_datetime(&naive).fixed_offset(),
            whole_day: false,
        });
    }

    let zone = match tzid {
        Some(id) => id.parse::<Tz>().unwrap_or_else(|_| {
            debug!(tzid = %id, default = %default_tz, "Unknown TZID, using default zone");
            *default_tz
        }),
        None => *default_tz,
    };

    let naive = ["%Y%m%dT%H%M%S", "%Y%m%dT%H%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| ProviderError::parse(format!("unsupported datetime {:?}", value)))?;

    Ok(ResolvedTime {
        instant: localize(&zone, naive, value)?,
        whole_day: false,
    })
}

/// Places a local time in `zone`. Ambiguous times take the earlier instant.
fn localize(zone: &Tz, naive: NaiveDateTime, raw: &str) -> ProviderResult<DateTime<FixedOffset>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.fixed_offset()),
        LocalResult::None => Err(ProviderError::parse(format!(
            "local time {:?} does not exist in {}",
            raw, zone
        ))),
    }
}
