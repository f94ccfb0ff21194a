//! XML utilities for CalDAV WebDAV operations.
//!
//! This module generates the PROPFIND and REPORT request bodies and parses
//! the multistatus documents servers answer with.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::error::{ProviderError, ProviderResult};

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Generates a PROPFIND body asking for `current-user-principal`.
pub fn propfind_principal_body() -> ProviderResult<String> {
    propfind_body(&["d:current-user-principal"])
}

/// Generates a PROPFIND body asking for `calendar-home-set`.
pub fn propfind_home_set_body() -> ProviderResult<String> {
    propfind_body(&["c:calendar-home-set"])
}

/// Generates a PROPFIND body for calendar discovery.
pub fn propfind_calendars_body() -> ProviderResult<String> {
    propfind_body(&["d:displayname", "d:resourcetype"])
}

fn propfind_body(props: &[&str]) -> ProviderResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_declaration(&mut writer)?;

    // <d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
    let mut propfind = BytesStart::new("d:propfind");
    propfind.push_attribute(("xmlns:d", DAV_NS));
    propfind.push_attribute(("xmlns:c", CALDAV_NS));
    write(&mut writer, Event::Start(propfind))?;

    write(&mut writer, Event::Start(BytesStart::new("d:prop")))?;
    for prop in props {
        write(&mut writer, Event::Empty(BytesStart::new(*prop)))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("d:prop")))?;

    write(&mut writer, Event::End(BytesEnd::new("d:propfind")))?;
    finish(writer)
}

/// Generates a REPORT request body for fetching calendar events.
///
/// Uses calendar-query with a VEVENT time-range filter.
pub fn calendar_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_declaration(&mut writer)?;

    // <c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
    let mut query = BytesStart::new("c:calendar-query");
    query.push_attribute(("xmlns:d", DAV_NS));
    query.push_attribute(("xmlns:c", CALDAV_NS));
    write(&mut writer, Event::Start(query))?;

    write(&mut writer, Event::Start(BytesStart::new("d:prop")))?;
    write(&mut writer, Event::Empty(BytesStart::new("d:getetag")))?;
    write(&mut writer, Event::Empty(BytesStart::new("c:calendar-data")))?;
    write(&mut writer, Event::End(BytesEnd::new("d:prop")))?;

    write(&mut writer, Event::Start(BytesStart::new("c:filter")))?;

    let mut vcal_filter = BytesStart::new("c:comp-filter");
    vcal_filter.push_attribute(("name", "VCALENDAR"));
    write(&mut writer, Event::Start(vcal_filter))?;

    let mut vevent_filter = BytesStart::new("c:comp-filter");
    vevent_filter.push_attribute(("name", "VEVENT"));
    write(&mut writer, Event::Start(vevent_filter))?;

    let mut time_range = BytesStart::new("c:time-range");
    time_range.push_attribute(("start", format_icalendar_datetime(start).as_str()));
    time_range.push_attribute(("end", format_icalendar_datetime(end).as_str()));
    write(&mut writer, Event::Empty(time_range))?;

    // VEVENT, VCALENDAR
    write(&mut writer, Event::End(BytesEnd::new("c:comp-filter")))?;
    write(&mut writer, Event::End(BytesEnd::new("c:comp-filter")))?;

    write(&mut writer, Event::End(BytesEnd::new("c:filter")))?;
    write(&mut writer, Event::End(BytesEnd::new("c:calendar-query")))?;
    finish(writer)
}

fn write_declaration(writer: &mut XmlWriter) -> ProviderResult<()> {
    write(
        writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )
}

fn write(writer: &mut XmlWriter, event: Event<'_>) -> ProviderResult<()> {
    writer
        .write_event(event)
        .map_err(|e| ProviderError::internal(format!("failed to write XML: {}", e)))
}

fn finish(writer: XmlWriter) -> ProviderResult<String> {
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| ProviderError::internal("generated XML is not UTF-8").with_source(e))
}

/// A parsed `multistatus` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multistatus {
    /// One entry per `response` element, in document order.
    pub responses: Vec<MultistatusResponse>,
}

/// One `response` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultistatusResponse {
    /// The resource href, trimmed.
    pub href: String,
    /// Properties from every propstat with a 2xx (or missing) status.
    pub props: Vec<Prop>,
}

/// One property element inside `prop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prop {
    /// Local name of the element, e.g. `displayname`.
    pub name: String,
    /// Text directly inside the element.
    pub text: String,
    /// Texts of nested `href` elements, trimmed.
    pub hrefs: Vec<String>,
    /// Local names of direct child elements, e.g. `calendar` in `resourcetype`.
    pub children: Vec<String>,
}

impl MultistatusResponse {
    /// Returns the first property called `name`.
    pub fn prop(&self, name: &str) -> Option<&Prop> {
        self.props.iter().find(|prop| prop.name == name)
    }
}

impl Multistatus {
    /// Returns the first non-empty href nested in property `name`.
    pub fn first_href(&self, name: &str) -> Option<&str> {
        self.responses
            .iter()
            .filter_map(|response| response.prop(name))
            .flat_map(|prop| prop.hrefs.iter())
            .map(String::as_str)
            .find(|href| !href.is_empty())
    }

    /// Returns `(href, display name)` for every response whose
    /// `resourcetype` contains a `calendar` element.
    pub fn calendars(&self) -> Vec<(&str, String)> {
        self.responses
            .iter()
            .filter(|response| {
                response.prop("resourcetype").is_some_and(|prop| {
                    prop.children.iter().any(|child| child == "calendar")
                })
            })
            .map(|response| {
                let name = response
                    .prop("displayname")
                    .map(|prop| prop.text.trim().to_string())
                    .unwrap_or_default();
                (response.href.as_str(), name)
            })
            .collect()
    }

    /// Returns every non-empty `calendar-data` value, trimmed.
    pub fn calendar_data(&self) -> Vec<String> {
        self.responses
            .iter()
            .flat_map(|response| response.props.iter())
            .filter(|prop| prop.name == "calendar-data")
            .map(|prop| prop.text.trim().to_string())
            .filter(|data| !data.is_empty())
            .collect()
    }
}

/// Parses a multistatus document.
///
/// Element names are matched by local name, so any namespace prefix works.
pub fn parse_multistatus(xml: &str) -> ProviderResult<Multistatus> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut parser = MultistatusParser::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            ProviderError::invalid_response(format!(
                "malformed multistatus at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(e) => {
                parser.open(local_name(e.name().as_ref()));
            }
            Event::Empty(e) => {
                parser.open(local_name(e.name().as_ref()));
                parser.close();
            }
            Event::End(_) => parser.close(),
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| {
                    ProviderError::invalid_response(format!("malformed text in multistatus: {}", err))
                })?;
                parser.text(&text);
            }
            Event::CData(e) => parser.text(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Multistatus {
        responses: parser.responses,
    })
}

#[derive(Default)]
struct MultistatusParser {
    stack: Vec<String>,
    responses: Vec<MultistatusResponse>,
    response: Option<MultistatusResponse>,
    propstat: Option<Propstat>,
    prop: Option<Prop>,
    /// Stack depth of the open property element.
    prop_depth: usize,
    buffer: String,
}

#[derive(Default)]
struct Propstat {
    status: Option<String>,
    props: Vec<Prop>,
}

impl Propstat {
    fn is_success(&self) -> bool {
        let Some(status) = &self.status else {
            return true;
        };
        status
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .is_some_and(|code| (200..300).contains(&code))
    }
}

impl MultistatusParser {
    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn open(&mut self, name: String) {
        let parent = self.parent().unwrap_or("").to_string();
        self.buffer.clear();

        if let Some(prop) = &mut self.prop {
            if self.stack.len() == self.prop_depth {
                prop.children.push(name.clone());
            }
        } else if self.propstat.is_some() && parent == "prop" {
            self.prop = Some(Prop {
                name: name.clone(),
                ..Prop::default()
            });
            self.prop_depth = self.stack.len() + 1;
        } else if name == "propstat" && parent == "response" {
            self.propstat = Some(Propstat::default());
        } else if name == "response" {
            self.response = Some(MultistatusResponse::default());
        }

        self.stack.push(name);
    }

    fn text(&mut self, text: &str) {
        match &mut self.prop {
            Some(prop) if self.stack.len() == self.prop_depth => prop.text.push_str(text),
            _ => self.buffer.push_str(text),
        }
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let parent = self.parent().unwrap_or("").to_string();
        let text = std::mem::take(&mut self.buffer);

        if self.prop.is_some() {
            if self.stack.len() + 1 == self.prop_depth {
                if let (Some(prop), Some(propstat)) = (self.prop.take(), &mut self.propstat) {
                    propstat.props.push(prop);
                }
            } else if name == "href"
                && let Some(prop) = &mut self.prop
            {
                prop.hrefs.push(text.trim().to_string());
            }
            return;
        }

        match (name.as_str(), parent.as_str()) {
            ("href", "response") => {
                if let Some(response) = &mut self.response {
                    response.href = text.trim().to_string();
                }
            }
            ("status", "propstat") => {
                if let Some(propstat) = &mut self.propstat {
                    propstat.status = Some(text.trim().to_string());
                }
            }
            ("propstat", _) => {
                if let (Some(propstat), Some(response)) = (self.propstat.take(), &mut self.response)
                    && propstat.is_success()
                {
                    response.props.extend(propstat.props);
                }
            }
            ("response", _) => {
                if let Some(response) = self.response.take() {
                    self.responses.push(response);
                }
            }
            _ => {}
        }
    }
}

/// Extracts the local name from a potentially namespaced element name.
fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

/// Formats a datetime for iCalendar time-range filters (UTC format).
pub fn format_icalendar_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn propfind_bodies() {
        let body = propfind_principal_body().unwrap();
        assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(body.contains("<d:propfind xmlns:d=\"DAV:\""));
        assert!(body.contains("<d:current-user-principal/>"));

        assert!(propfind_home_set_body()
            .unwrap()
            .contains("<c:calendar-home-set/>"));

        let body = propfind_calendars_body().unwrap();
        assert!(body.contains("<d:displayname/>"));
        assert!(body.contains("<d:resourcetype/>"));
    }

    #[test]
    fn calendar_query_body_generation() {
        let start = Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();

        let body = calendar_query_body(start, end).unwrap();

        assert!(body.contains("calendar-query"));
        assert!(body.contains("<c:calendar-data/>"));
        assert!(body.contains("<c:comp-filter name=\"VCALENDAR\">"));
        assert!(body.contains("<c:comp-filter name=\"VEVENT\">"));
        assert!(body.contains("<c:time-range start=\"20240229T230000Z\" end=\"20240301T230000Z\"/>"));
    }

    #[test]
    fn parse_principal_with_any_prefix() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/</D:href>
    <D:propstat>
      <D:prop>
        <D:current-user-principal><D:href> /123456/principal/ </D:href></D:current-user-principal>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

        let ms = parse_multistatus(xml).unwrap();
        assert_eq!(ms.responses.len(), 1);
        assert_eq!(ms.responses[0].href, "/");
        assert_eq!(
            ms.first_href("current-user-principal"),
            Some("/123456/principal/")
        );
        assert_eq!(ms.first_href("calendar-home-set"), None);
    }

    #[test]
    fn failed_propstats_are_ignored() {
        let xml = r#"<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/principal/</href>
    <propstat>
      <prop><C:calendar-home-set><href>/wrong/</href></C:calendar-home-set></prop>
      <status>HTTP/1.1 404 Not Found</status>
    </propstat>
    <propstat>
      <prop><C:calendar-home-set><href>https://p07.example.net/home/</href></C:calendar-home-set></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let ms = parse_multistatus(xml).unwrap();
        assert_eq!(
            ms.first_href("calendar-home-set"),
            Some("https://p07.example.net/home/")
        );
    }

    #[test]
    fn parse_calendar_listing() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/home/</href>
    <propstat>
      <prop>
        <displayname>Home</displayname>
        <resourcetype><collection/></resourcetype>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/home/work/</href>
    <propstat>
      <prop>
        <displayname>  Work  </displayname>
        <resourcetype>
          <collection/>
          <C:calendar/>
        </resourcetype>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/home/inbox/</href>
    <propstat>
      <prop>
        <resourcetype><collection/><C:schedule-inbox/></resourcetype>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/home/private/</href>
    <propstat>
      <prop>
        <resourcetype><collection/><C:calendar/></resourcetype>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
    <propstat>
      <prop><displayname/></prop>
      <status>HTTP/1.1 404 Not Found</status>
    </propstat>
  </response>
</multistatus>"#;

        let ms = parse_multistatus(xml).unwrap();
        assert_eq!(
            ms.calendars(),
            vec![
                ("/home/work/", "Work".to_string()),
                ("/home/private/", String::new())
            ]
        );
    }

    #[test]
    fn parse_calendar_data_with_entities_and_cdata() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/home/work/e1.ics</href>
    <propstat>
      <prop>
        <getetag>"abc123"</getetag>
        <C:calendar-data>BEGIN:VCALENDAR&#13;
SUMMARY:Tom &amp; Jerry&#13;
END:VCALENDAR&#13;
</C:calendar-data>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/home/work/e2.ics</href>
    <propstat>
      <prop>
        <C:calendar-data><![CDATA[BEGIN:VCALENDAR
END:VCALENDAR]]></C:calendar-data>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/home/work/e3.ics</href>
    <propstat>
      <prop><C:calendar-data>   </C:calendar-data></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let data = parse_multistatus(xml).unwrap().calendar_data();
        assert_eq!(data.len(), 2);
        assert!(data[0].starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(data[0].contains("SUMMARY:Tom & Jerry"));
        assert!(data[0].ends_with("END:VCALENDAR"));
        assert_eq!(data[1], "BEGIN:VCALENDAR\nEND:VCALENDAR");
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_multistatus("<multistatus><response></multistatus>").is_err());
    }

    #[test]
    fn format_datetime_for_icalendar() {
        let dt = Utc.with_ymd_and_hms(2025, 2, 5, 14, 30, 0).unwrap();
        assert_eq!(format_icalendar_datetime(dt), "20250205T143000Z");
    }
}
