//! Configuration and failure reporting for [`TcpStreamWriter`](super::TcpStreamWriter).

use std::{fmt, io, sync::Arc};

use thiserror::Error;

use super::reconnect::{ExponentialBackoff, ReconnectError, ReconnectPolicy};

/// Default number of entries held while disconnected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Failures observed by the writer's background loop.
#[derive(Debug, Error)]
pub enum TcpWriterError {
    /// Writing an entry failed; the writer is reconnecting.
    #[error("failed to send entry: {0}")]
    Send(#[source] io::Error),
    /// The reconnect policy gave up; the writer has stopped.
    #[error("writer stopped: {0}")]
    ReconnectExhausted(#[source] ReconnectError),
}

pub type TcpFailureHandler = Arc<dyn Fn(&TcpWriterError) + Send + Sync>;

pub struct TcpWriterConfig {
    pub queue_capacity: usize,
    pub reconnect_policy: Box<dyn ReconnectPolicy>,
    pub failure_handler: Option<TcpFailureHandler>,
}

impl Default for TcpWriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect_policy: Box::new(ExponentialBackoff::default()),
            failure_handler: None,
        }
    }
}

impl TcpWriterConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: impl ReconnectPolicy + 'static) -> Self {
        self.reconnect_policy = Box::new(policy);
        self
    }

    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TcpWriterError) + Send + Sync + 'static,
    {
        self.failure_handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for TcpWriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpWriterConfig")
            .field("queue_capacity", &self.queue_capacity)
            .field("failure_handler", &self.failure_handler.is_some())
            .finish_non_exhaustive()
    }
}
