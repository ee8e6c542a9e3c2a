//! Configuration consumed by [`HttpEventSender`](super::HttpEventSender).
//!
//! `HttpSenderBuilder` validates user input before producing these values.

use std::{fmt, time::Duration};

use crate::{
    event_record::{EventMetadata, SharedEventFormatter},
    http_transport::HttpTransportConfig,
    middleware::MiddlewarePipeline,
};

/// Default time `close` waits for in-flight batches.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
/// Sleep between polls of the in-flight counter while waiting.
pub const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The three independent flush knobs. Zero disables a knob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchConfig {
    /// Period of the forced flush in milliseconds.
    pub interval_ms: u64,
    /// Flush once the serialised batch reaches this many bytes.
    pub size_bytes: usize,
    /// Flush once the batch holds this many events.
    pub size_count: usize,
}

/// Thresholds derived from a [`BatchConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushTriggers {
    pub interval: Option<Duration>,
    pub max_count: usize,
    pub max_bytes: usize,
}

impl BatchConfig {
    /// Resolve the configured knobs into concrete thresholds.
    ///
    /// With every knob at zero each event is sent on its own. Any size knob
    /// left at zero is unbounded once another knob is set, so configuring one
    /// dimension never imposes a limit on the other.
    pub fn triggers(&self) -> FlushTriggers {
        let interval = (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms));
        if interval.is_none() && self.size_bytes == 0 && self.size_count == 0 {
            return FlushTriggers {
                interval: None,
                max_count: 1,
                max_bytes: usize::MAX,
            };
        }
        let unbounded = |value: usize| if value == 0 { usize::MAX } else { value };
        FlushTriggers {
            interval,
            max_count: unbounded(self.size_count),
            max_bytes: unbounded(self.size_bytes),
        }
    }
}

impl FlushTriggers {
    /// `true` when a batch of `count` events and `bytes` bytes must flush.
    pub fn is_due(&self, count: usize, bytes: usize) -> bool {
        count >= self.max_count || bytes >= self.max_bytes
    }
}

/// How flushed batches are handed to the transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendMode {
    /// Every flush runs on its own worker; batches may complete out of order.
    #[default]
    Parallel,
    /// One dispatcher sends batches one at a time in formation order.
    Sequential,
}

/// Configuration object describing an [`HttpEventSender`](super::HttpEventSender).
#[derive(Clone)]
pub struct HttpSenderConfig {
    pub transport: HttpTransportConfig,
    pub token: String,
    /// Metadata attached to events that carry none of their own.
    pub metadata: EventMetadata,
    pub batch: BatchConfig,
    pub send_mode: SendMode,
    pub shutdown_timeout: Duration,
    pub middleware: MiddlewarePipeline,
    pub formatter: Option<SharedEventFormatter>,
}

impl HttpSenderConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            transport: HttpTransportConfig::new(endpoint),
            token: token.into(),
            metadata: EventMetadata::default(),
            batch: BatchConfig::default(),
            send_mode: SendMode::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            middleware: MiddlewarePipeline::default(),
            formatter: None,
        }
    }
}

impl fmt::Debug for HttpSenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSenderConfig")
            .field("transport", &self.transport)
            .field("token", &"<redacted>")
            .field("metadata", &self.metadata)
            .field("batch", &self.batch)
            .field("send_mode", &self.send_mode)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("middleware", &self.middleware)
            .field("formatter", &self.formatter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn batch(interval_ms: u64, size_bytes: usize, size_count: usize) -> BatchConfig {
        BatchConfig {
            interval_ms,
            size_bytes,
            size_count,
        }
    }

    #[rstest]
    fn unconfigured_batches_send_every_event() {
        let triggers = batch(0, 0, 0).triggers();
        assert_eq!(triggers.interval, None);
        assert!(triggers.is_due(1, 0));
    }

    #[rstest]
    fn interval_only_leaves_sizes_unbounded() {
        let triggers = batch(250, 0, 0).triggers();
        assert_eq!(triggers.interval, Some(Duration::from_millis(250)));
        assert_eq!(triggers.max_count, usize::MAX);
        assert_eq!(triggers.max_bytes, usize::MAX);
    }

    #[rstest]
    #[case(batch(0, 0, 10), 10, usize::MAX)]
    #[case(batch(0, 4096, 0), usize::MAX, 4096)]
    #[case(batch(0, 4096, 10), 10, 4096)]
    fn one_size_knob_does_not_bound_the_other(
        #[case] config: BatchConfig,
        #[case] count: usize,
        #[case] bytes: usize,
    ) {
        let triggers = config.triggers();
        assert_eq!(triggers.max_count, count);
        assert_eq!(triggers.max_bytes, bytes);
    }

    #[rstest]
    fn either_threshold_makes_a_batch_due() {
        let triggers = batch(0, 100, 3).triggers();
        assert!(!triggers.is_due(2, 99));
        assert!(triggers.is_due(3, 10));
        assert!(triggers.is_due(1, 100));
    }

    #[rstest]
    fn debug_output_redacts_token() {
        let config = HttpSenderConfig::new("http://collector", "secret-token");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
