//! Phone number extraction from event text.

use phonenumber::{Mode, country};
use smsremind_core::Event;

/// Finds the recipient number in free text.
pub trait NumberExtractor {
    /// Returns the first number in `text`, formatted as E.164.
    fn extract(&self, text: &str) -> Option<String>;

    /// Looks in the summary, then the description, then the comment.
    fn event_number(&self, event: &Event) -> Option<String> {
        event
            .text_fields()
            .into_iter()
            .find_map(|text| self.extract(text))
    }
}

/// Region-aware extractor backed by libphonenumber metadata.
///
/// Each line is tried on its own; the candidate starts at the first `+` or
/// digit of the line, so labels like `Tel: ` in front of the number are fine.
#[derive(Debug, Clone, Copy)]
pub struct PhoneExtractor {
    region: country::Id,
}

impl PhoneExtractor {
    /// Creates an extractor that reads national numbers as `region` numbers.
    pub fn new(region: country::Id) -> Self {
        Self { region }
    }

    fn parse_line(&self, line: &str) -> Option<String> {
        let start = line.find(|c: char| c == '+' || c.is_ascii_digit())?;
        let candidate = line[start..].trim();
        let number = phonenumber::parse(Some(self.region), candidate).ok()?;
        phonenumber::is_valid(&number).then(|| number.format().mode(Mode::E164).to_string())
    }
}

impl Default for PhoneExtractor {
    fn default() -> Self {
        Self::new(country::Id::AT)
    }
}

impl NumberExtractor for PhoneExtractor {
    fn extract(&self, text: &str) -> Option<String> {
        text.lines().find_map(|line| self.parse_line(line))
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    #[test]
    fn austrian_formats() {
        let extractor = PhoneExtractor::default();
        for text in [
            "+436604670967",
            "06604670967",
            "0660 4670967",
            "+43 660 4670967",
        ] {
            assert_eq!(
                extractor.extract(text).as_deref(),
                Some("+436604670967"),
                "{}",
                text
            );
        }
    }

    #[test]
    fn number_after_label() {
        let extractor = PhoneExtractor::default();
        assert_eq!(
            extractor.extract("Tel: 0660 4670967").as_deref(),
            Some("+436604670967")
        );
    }

    #[test]
    fn first_parsable_line_wins() {
        let extractor = PhoneExtractor::default();
        let text = "Kontrolle\n0660 4670967\n+43 664 1234567";
        assert_eq!(extractor.extract(text).as_deref(), Some("+436604670967"));
    }

    #[test]
    fn no_number() {
        let extractor = PhoneExtractor::default();
        assert_eq!(extractor.extract(""), None);
        assert_eq!(extractor.extract("Team meeting"), None);
        assert_eq!(extractor.extract("Room 12"), None);
    }

    #[test]
    fn region_applies_to_national_numbers() {
        let extractor = PhoneExtractor::new(country::Id::DE);
        assert_eq!(
            extractor.extract("030 12345678").as_deref(),
            Some("+493012345678")
        );
    }

    #[test]
    fn event_lookup_order() {
        let start = DateTime::parse_from_rfc3339("2024-03-01T09:00:00+01:00").unwrap();
        let extractor = PhoneExtractor::default();

        let event = Event::new("E1", start, start)
            .with_summary("Checkup")
            .with_description("+43 660 4670967")
            .with_comment("0664 1234567");
        assert_eq!(
            extractor.event_number(&event).as_deref(),
            Some("+436604670967")
        );

        let event = Event::new("E2", start, start).with_comment("0660 4670967");
        assert_eq!(
            extractor.event_number(&event).as_deref(),
            Some("+436604670967")
        );

        let event = Event::new("E3", start, start).with_summary("Lunch");
        assert_eq!(extractor.event_number(&event), None);
    }
}
