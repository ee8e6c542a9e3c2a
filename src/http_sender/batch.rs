//! Pending batch buffer.
//!
//! The record list and its serialised payload are appended and taken
//! together; [`PendingBatch::take`] swaps both out in one step so the records
//! reported on failure always match the bytes that were sent.

use std::mem;

use crate::event_record::EventRecord;

/// A flushed batch owned by one transport attempt.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    pub(crate) events: Vec<EventRecord>,
    pub(crate) payload: String,
}

impl Batch {
    pub(crate) fn into_events(self) -> Vec<EventRecord> {
        self.events
    }
}

/// Accumulates events until a flush trigger fires.
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    current: Batch,
}

impl PendingBatch {
    pub(crate) fn push(&mut self, record: EventRecord, serialised: &str) {
        self.current.payload.push_str(serialised);
        self.current.events.push(record);
    }

    pub(crate) fn len(&self) -> usize {
        self.current.events.len()
    }

    pub(crate) fn bytes(&self) -> usize {
        self.current.payload.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.current.events.is_empty()
    }

    /// Swap out the accumulated batch, leaving a fresh empty one.
    pub(crate) fn take(&mut self) -> Option<Batch> {
        if self.is_empty() {
            return None;
        }
        Some(mem::take(&mut self.current))
    }
}
