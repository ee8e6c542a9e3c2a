//! Text lines for the TCP and UDP paths.
//!
//! Each entry is `<ISO-8601 local timestamp> <message>\r\n` with no
//! structured envelope. [`LineFormatter`] decides what the message part of
//! an [`EventRecord`] looks like; the timestamp and terminator are fixed.

use std::{sync::Arc, time::SystemTime};

use chrono::{DateTime, Local, SecondsFormat};

use crate::event_record::EventRecord;

/// Line terminator expected by raw TCP/UDP collectors.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Render the message portion of a line.
pub trait LineFormatter: Send + Sync {
    fn format_message(&self, record: &EventRecord) -> String;
}

impl<F> LineFormatter for F
where
    F: Fn(&EventRecord) -> String + Send + Sync,
{
    fn format_message(&self, record: &EventRecord) -> String {
        self(record)
    }
}

pub type SharedLineFormatter = Arc<dyn LineFormatter>;

/// Uses the record's message, falling back to its data as compact JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultLineFormatter;

impl LineFormatter for DefaultLineFormatter {
    fn format_message(&self, record: &EventRecord) -> String {
        if let Some(message) = record.message() {
            return message.to_owned();
        }
        record.data().map(ToString::to_string).unwrap_or_default()
    }
}

/// Build a complete wire line from a timestamp and message.
pub fn format_line(timestamp: SystemTime, message: &str) -> String {
    let local: DateTime<Local> = timestamp.into();
    format!(
        "{} {message}{LINE_TERMINATOR}",
        local.to_rfc3339_opts(SecondsFormat::Millis, false)
    )
}

/// Format `record` with `formatter` into a complete wire line.
pub fn render_line(formatter: &dyn LineFormatter, record: &EventRecord) -> String {
    format_line(record.timestamp(), &formatter.format_message(record))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use chrono::FixedOffset;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn line_has_local_timestamp_message_and_crlf() {
        let stamp = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        let line = format_line(stamp, "hello world");

        let (timestamp, rest) = line.split_once(' ').expect("separator");
        assert_eq!(rest, "hello world\r\n");
        let parsed = DateTime::<FixedOffset>::parse_from_rfc3339(timestamp).expect("iso-8601");
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_250);
    }

    #[rstest]
    #[case(EventRecord::new().with_message("text"), "text")]
    #[case(EventRecord::new().with_data_value(json!({"k": 1})), "{\"k\":1}")]
    #[case(EventRecord::new(), "")]
    fn default_formatter_prefers_message(#[case] record: EventRecord, #[case] expected: &str) {
        assert_eq!(DefaultLineFormatter.format_message(&record), expected);
    }

    #[rstest]
    fn closures_are_formatters() {
        let formatter = |record: &EventRecord| {
            format!("[{}] {}", record.severity().unwrap_or("-"), record.message().unwrap_or(""))
        };
        let record = EventRecord::new().with_severity("WARN").with_message("disk");
        let line = render_line(&formatter, &record);
        assert!(line.ends_with(" [WARN] disk\r\n"));
    }
}
