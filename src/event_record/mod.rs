//! Event records forwarded to an HTTP event collector.
//!
//! An [`EventRecord`] captures one log call: optional identifier, severity,
//! message and structured data, plus the collector metadata tuple
//! (`index`, `source`, `sourcetype`, `host`). Records are built once by an
//! adapter and never mutated after they are handed to a sender. The metadata
//! is carried to the wire untouched; nothing in the crate interprets it.

mod formatter;
mod wire;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use formatter::{DefaultEventFormatter, EventFormatter, SharedEventFormatter};
pub use wire::{decode_events, format_epoch_seconds, parse_epoch_seconds};

/// Collector routing metadata attached to every event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        rename = "sourcetype",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

macro_rules! metadata_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: impl Into<String>) -> Self {
            self.$field = Some(value.into());
            self
        }
    };
}

impl EventMetadata {
    /// Metadata with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    metadata_setter!(
        /// Set the target index.
        with_index,
        index
    );
    metadata_setter!(
        /// Set the event source.
        with_source,
        source
    );
    metadata_setter!(
        /// Set the source type, serialised as `sourcetype`.
        with_source_type,
        source_type
    );
    metadata_setter!(
        /// Set the originating host name.
        with_host,
        host
    );

    /// Return `true` when no metadata field is set.
    pub fn is_empty(&self) -> bool {
        self.index.is_none()
            && self.source.is_none()
            && self.source_type.is_none()
            && self.host.is_none()
    }
}

/// One log entry plus its collector metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    timestamp: SystemTime,
    id: Option<String>,
    severity: Option<String>,
    message: Option<String>,
    data: Option<Value>,
    metadata: EventMetadata,
}

impl EventRecord {
    /// Create a record stamped with the current time.
    pub fn new() -> Self {
        Self::at(SystemTime::now())
    }

    /// Create a record with an explicit timestamp, for replayed or
    /// back-dated events.
    pub fn at(timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            id: None,
            severity: None,
            message: None,
            data: None,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach an already-built JSON payload.
    pub fn with_data_value(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach arbitrary structured data.
    ///
    /// # Errors
    ///
    /// Fails when `data` cannot be represented as JSON, for example a map
    /// keyed by non-string values.
    pub fn with_data<T>(self, data: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(data)?;
        Ok(self.with_data_value(value))
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn severity(&self) -> Option<&str> {
        self.severity.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Serialise the record into its single-object wire form.
    ///
    /// When `formatter` is `None` the `event` body is produced by
    /// [`DefaultEventFormatter`].
    pub fn to_wire_json(
        &self,
        formatter: Option<&dyn EventFormatter>,
    ) -> Result<String, serde_json::Error> {
        wire::encode_event(self, formatter)
    }
}

impl Default for EventRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn demo_metadata() -> EventMetadata {
        EventMetadata::new()
            .with_index("main")
            .with_source("localhost")
            .with_source_type("log")
            .with_host("demohost")
    }

    #[rstest]
    fn metadata_and_message_survive_the_wire(demo_metadata: EventMetadata) {
        let record = EventRecord::new()
            .with_message("info")
            .with_metadata(demo_metadata.clone());
        let json = record.to_wire_json(None).expect("serialise");

        let decoded = decode_events(&json).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].metadata(), &demo_metadata);
        assert_eq!(decoded[0].message(), Some("info"));
    }

    #[rstest]
    fn wire_form_uses_collector_field_names(demo_metadata: EventMetadata) {
        let record = EventRecord::at(UNIX_EPOCH + Duration::from_millis(1_700_000_000_123))
            .with_id("42")
            .with_severity("INFO")
            .with_message("hello")
            .with_metadata(demo_metadata);
        let json = record.to_wire_json(None).expect("serialise");
        let parsed: Value = serde_json::from_str(&json).expect("parse");

        assert_eq!(parsed["time"], "1700000000.123");
        assert_eq!(parsed["index"], "main");
        assert_eq!(parsed["sourcetype"], "log");
        assert_eq!(parsed["event"]["id"], "42");
        assert_eq!(parsed["event"]["severity"], "INFO");
        assert_eq!(parsed["event"]["message"], "hello");
        assert!(parsed.get("source_type").is_none());
    }

    #[rstest]
    fn unset_fields_are_omitted() {
        let json = EventRecord::new()
            .with_message("bare")
            .to_wire_json(None)
            .expect("serialise");
        let parsed: Value = serde_json::from_str(&json).expect("parse");
        assert!(parsed.get("index").is_none());
        assert!(parsed.get("host").is_none());
        assert!(parsed["event"].get("id").is_none());
        assert!(parsed["event"].get("data").is_none());
    }

    #[rstest]
    fn structured_data_is_embedded_as_is() {
        let record = EventRecord::new()
            .with_data(&json!({"user": "ada", "attempts": [1, 2]}))
            .expect("data");
        let json = record.to_wire_json(None).expect("serialise");
        let parsed: Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed["event"]["data"]["user"], "ada");
        assert_eq!(parsed["event"]["data"]["attempts"][1], 2);
    }

    #[rstest]
    fn non_string_map_keys_are_rejected() {
        let mut data = std::collections::BTreeMap::new();
        data.insert((1, 2), "pair");
        assert!(EventRecord::new().with_data(&data).is_err());
    }

    #[rstest]
    fn empty_metadata_reports_empty() {
        assert!(EventMetadata::new().is_empty());
        assert!(!EventMetadata::new().with_host("h").is_empty());
    }
}
