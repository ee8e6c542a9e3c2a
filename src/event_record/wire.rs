//! JSON wire encoding for collector events.
//!
//! Each record becomes one JSON object:
//!
//! ```text
//! {"time":"1700000000.123","index":"main",...,"event":{"message":"..."}}
//! ```
//!
//! A batch is the plain concatenation of such objects with no enclosing
//! array and no separator. The collector endpoint parses the body as a stream
//! of objects, so [`decode_events`] does the same.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventFormatter, EventMetadata, EventRecord, formatter::DefaultEventFormatter};

#[derive(Serialize)]
struct WireEvent<'a> {
    time: String,
    #[serde(flatten)]
    metadata: &'a EventMetadata,
    event: Value,
}

#[derive(Deserialize)]
struct OwnedWireEvent {
    time: String,
    #[serde(flatten)]
    metadata: EventMetadata,
    event: Value,
}

pub(super) fn encode_event(
    record: &EventRecord,
    formatter: Option<&dyn EventFormatter>,
) -> Result<String, serde_json::Error> {
    let event = match formatter {
        Some(formatter) => formatter.format_event(record),
        None => DefaultEventFormatter.format_event(record),
    };
    serde_json::to_string(&WireEvent {
        time: format_epoch_seconds(record.timestamp()),
        metadata: record.metadata(),
        event,
    })
}

/// Format a timestamp as epoch seconds with exactly three decimals.
///
/// Times before the Unix epoch clamp to `"0.000"`.
pub fn format_epoch_seconds(timestamp: SystemTime) -> String {
    let since_epoch = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}.{:03}",
        since_epoch.as_secs(),
        since_epoch.subsec_millis()
    )
}

/// Parse an epoch-seconds string such as `"1700000000.123"`.
///
/// Digits beyond millisecond precision are ignored.
pub fn parse_epoch_seconds(value: &str) -> Option<SystemTime> {
    let (secs, frac) = value.split_once('.').unwrap_or((value, ""));
    let secs: u64 = secs.parse().ok()?;
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut millis = 0u64;
    for (position, digit) in frac.bytes().take(3).enumerate() {
        let scale = 10u64.pow(2 - position as u32);
        millis += u64::from(digit - b'0') * scale;
    }
    UNIX_EPOCH.checked_add(Duration::from_secs(secs) + Duration::from_millis(millis))
}

/// Decode a concatenated-object payload back into records.
///
/// The `event` body is unpacked the way [`DefaultEventFormatter`] builds it.
/// A body that is not an object (for example the output of a custom
/// formatter) is kept whole as the record's data.
///
/// # Errors
///
/// Returns the first JSON error encountered, or a custom error when a
/// `time` field is not an epoch-seconds string.
pub fn decode_events(payload: &str) -> Result<Vec<EventRecord>, serde_json::Error> {
    serde_json::Deserializer::from_str(payload)
        .into_iter::<OwnedWireEvent>()
        .map(|item| item.and_then(into_record))
        .collect()
}

fn into_record(wire: OwnedWireEvent) -> Result<EventRecord, serde_json::Error> {
    let timestamp = parse_epoch_seconds(&wire.time).ok_or_else(|| {
        <serde_json::Error as serde::de::Error>::custom(format!(
            "invalid event time '{}'",
            wire.time
        ))
    })?;
    let mut record = EventRecord::at(timestamp).with_metadata(wire.metadata);
    match wire.event {
        Value::Object(mut body) => {
            if let Some(Value::String(id)) = body.remove("id") {
                record = record.with_id(id);
            }
            if let Some(Value::String(severity)) = body.remove("severity") {
                record = record.with_severity(severity);
            }
            if let Some(Value::String(message)) = body.remove("message") {
                record = record.with_message(message);
            }
            if let Some(data) = body.remove("data") {
                record = record.with_data_value(data);
            }
        }
        other => record = record.with_data_value(other),
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(UNIX_EPOCH, "0.000")]
    #[case(UNIX_EPOCH + Duration::from_millis(1_500), "1.500")]
    #[case(UNIX_EPOCH + Duration::from_micros(2_007_999), "2.007")]
    fn formats_three_decimals(#[case] timestamp: SystemTime, #[case] expected: &str) {
        assert_eq!(format_epoch_seconds(timestamp), expected);
    }

    #[rstest]
    fn pre_epoch_times_clamp_to_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(format_epoch_seconds(before), "0.000");
    }

    #[rstest]
    #[case("12.345", Some(12_345))]
    #[case("12.3", Some(12_300))]
    #[case("12", Some(12_000))]
    #[case("12.34567", Some(12_345))]
    #[case("x.1", None)]
    #[case("1.2a", None)]
    fn parses_epoch_seconds(#[case] input: &str, #[case] millis: Option<u64>) {
        let expected = millis.map(|ms| UNIX_EPOCH + Duration::from_millis(ms));
        assert_eq!(parse_epoch_seconds(input), expected);
    }

    #[rstest]
    fn decodes_concatenated_objects_in_order() {
        let payload = concat!(
            r#"{"time":"1.000","event":{"message":"info 1"}}"#,
            r#"{"time":"2.000","host":"h","event":{"message":"info 2"}}"#,
        );
        let records = decode_events(payload).expect("decode");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message(), Some("info 1"));
        assert_eq!(records[1].message(), Some("info 2"));
        assert_eq!(records[1].metadata().host.as_deref(), Some("h"));
    }

    #[rstest]
    fn non_object_body_becomes_data() {
        let records = decode_events(r#"{"time":"1.000","event":"plain"}"#).expect("decode");
        assert_eq!(records[0].data(), Some(&Value::String("plain".into())));
        assert_eq!(records[0].message(), None);
    }

    #[rstest]
    fn rejects_bad_time() {
        assert!(decode_events(r#"{"time":"soon","event":{}}"#).is_err());
    }
}
