//! Batching sender for HTTP event collectors.
//!
//! This module defines [`HttpEventSender`], which accumulates
//! [`EventRecord`](crate::event_record::EventRecord) values into a pending
//! batch and hands each flushed batch to a background worker. A batch is
//! flushed when any configured trigger fires:
//!
//! - **count**: the batch holds `size_count` events;
//! - **bytes**: the serialised batch reaches `size_bytes` bytes;
//! - **interval**: a timer thread forces a flush every `interval_ms`.
//!
//! # Delivery semantics
//!
//! Each flush is delivered independently. In [`SendMode::Parallel`] several
//! batches may be in flight at once and may complete out of order;
//! [`SendMode::Sequential`] trades throughput for formation-order delivery.
//! Record order within a batch is always preserved.
//!
//! Terminal failures (an application error, or a retry budget spent by the
//! middleware chain) are reported once to every registered error observer
//! together with the records of the failed batch. Producers never observe
//! network failures.

mod batch;
mod config;
mod dispatch;
mod failure;
mod sender;


pub use config::{
    BatchConfig, DEFAULT_SHUTDOWN_TIMEOUT, FLUSH_POLL_INTERVAL, FlushTriggers, HttpSenderConfig,
    SendMode,
};
pub use failure::{SendFailure, SendFailureCallback};
pub use sender::HttpEventSender;
