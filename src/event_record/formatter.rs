//! Formatters producing the `event` body of a collector payload.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

use super::EventRecord;

/// Maps a record to the JSON value placed under the `event` key.
///
/// Implementors must be thread-safe because senders format records on the
/// producer's thread and share the formatter between producers.
pub trait EventFormatter: Send + Sync {
    fn format_event(&self, record: &EventRecord) -> Value;
}

/// Builds `{"id", "severity", "message", "data"}`, omitting unset fields.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultEventFormatter;

impl EventFormatter for DefaultEventFormatter {
    fn format_event(&self, record: &EventRecord) -> Value {
        let mut body = Map::new();
        if let Some(id) = record.id() {
            body.insert("id".into(), Value::from(id));
        }
        if let Some(severity) = record.severity() {
            body.insert("severity".into(), Value::from(severity));
        }
        if let Some(message) = record.message() {
            body.insert("message".into(), Value::from(message));
        }
        if let Some(data) = record.data() {
            body.insert("data".into(), data.clone());
        }
        Value::Object(body)
    }
}

impl<F> EventFormatter for F
where
    F: Fn(&EventRecord) -> Value + Send + Sync,
{
    fn format_event(&self, record: &EventRecord) -> Value {
        self(record)
    }
}

/// Shared formatter trait object used by senders and builders.
#[derive(Clone)]
pub struct SharedEventFormatter {
    inner: Arc<dyn EventFormatter>,
}

impl SharedEventFormatter {
    pub fn new<F>(formatter: F) -> Self
    where
        F: EventFormatter + 'static,
    {
        Self {
            inner: Arc::new(formatter),
        }
    }

    pub fn as_dyn(&self) -> &dyn EventFormatter {
        self.inner.as_ref()
    }
}

impl fmt::Debug for SharedEventFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedEventFormatter(<dyn EventFormatter>)")
    }
}
