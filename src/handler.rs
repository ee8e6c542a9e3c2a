//! Adapter-facing handler seam and the errors it reports.

use std::any::Any;

use thiserror::Error;

use crate::event_record::EventRecord;

/// Errors surfaced synchronously to a producer.
///
/// Network failures never appear here; they are reported through the
/// callbacks registered on each sender or writer.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler has been closed or disposed.
    #[error("handler is closed")]
    Closed,
    /// The record could not be serialised inline.
    #[error("failed to serialise event: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Trait implemented by every forwarding surface.
///
/// Implementations are `Send + Sync` so adapters can share one handler
/// between threads. `handle` never blocks on network I/O.
pub trait EventHandler: Send + Sync {
    /// Accept a record for forwarding.
    fn handle(&self, record: &EventRecord) -> Result<(), HandlerError>;

    /// Push out anything buffered. Returns `false` when the handler could not
    /// confirm the flush.
    fn flush(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}
