//! Message templates.
//!
//! Reminder texts are rendered from a small template language with
//! `{{ .Field }}` placeholders, for example:
//!
//! ```text
//! Your next appointment is on {{ .StartDate }} at {{ .StartTime }}
//! ```
//!
//! Templates are parsed once at startup so that a typo in a placeholder is
//! reported before any calendar is contacted.

use std::str::FromStr;

use thiserror::Error;

use crate::event::Event;

/// The default reminder text.
pub const DEFAULT_TEMPLATE: &str = "Your next appointment is on {{ .StartDate }} at {{ .StartTime }}";

/// Errors raised while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `{{` without a matching `}}`.
    #[error("unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },

    /// A placeholder naming a field that does not exist.
    #[error("unknown placeholder {{{{ {name} }}}}")]
    UnknownField { name: String },
}

/// A field of [`Event`] that can be referenced from a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    StartDate,
    StartTime,
    EndTime,
    Summary,
    Description,
    Comment,
    Uid,
}

impl TemplateField {
    fn render(self, event: &Event) -> String {
        match self {
            Self::StartDate => event.start_date(),
            Self::StartTime => event.start_time(),
            Self::EndTime => event.end_time(),
            Self::Summary => event.summary.clone(),
            Self::Description => event.description.clone(),
            Self::Comment => event.comment.clone(),
            Self::Uid => event.uid.clone(),
        }
    }
}

impl FromStr for TemplateField {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let field = match name.strip_prefix('.').unwrap_or("") {
            "StartDate" => Self::StartDate,
            "StartTime" => Self::StartTime,
            "EndTime" => Self::EndTime,
            "Summary" => Self::Summary,
            "Description" => Self::Description,
            "Comment" => Self::Comment,
            "UID" => Self::Uid,
            _ => {
                return Err(TemplateError::UnknownField {
                    name: name.to_string(),
                });
            }
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(TemplateField),
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parses a template.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut consumed = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let inner = &rest[open + 2..];
            let close = inner.find("}}").ok_or(TemplateError::Unterminated {
                offset: consumed + open,
            })?;
            segments.push(Segment::Field(inner[..close].parse()?));

            let advance = open + 2 + close + 2;
            consumed += advance;
            rest = &rest[advance..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Renders the template against an event.
    ///
    /// Times are printed in the offset the event carries; call
    /// [`Event::localized`] first to print them in a specific timezone.
    pub fn render(&self, event: &Event) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Field(field) => field.render(event),
            })
            .collect()
    }

    /// Returns the original template text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            segments: vec![
                Segment::Literal("Your next appointment is on ".to_string()),
                Segment::Field(TemplateField::StartDate),
                Segment::Literal(" at ".to_string()),
                Segment::Field(TemplateField::StartTime),
            ],
        }
    }
}

impl FromStr for MessageTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
