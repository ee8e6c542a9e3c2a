//! Public sender type.

use std::{
    any::Any,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, bounded, select, tick};
use log::warn;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::{
    event_record::{EventMetadata, EventRecord, SharedEventFormatter},
    handler::{EventHandler, HandlerError},
    http_transport::{BatchTransport, UreqTransport},
};

use super::{
    batch::PendingBatch,
    config::{FLUSH_POLL_INTERVAL, FlushTriggers, HttpSenderConfig},
    dispatch::{Dispatcher, SenderCore},
    failure::SendFailure,
};

struct SenderShared {
    core: Arc<SenderCore>,
    dispatcher: Dispatcher,
    pending: Mutex<PendingBatch>,
    /// Set under the `pending` lock so no append can follow the final flush.
    closed: AtomicBool,
    triggers: FlushTriggers,
    metadata: EventMetadata,
    formatter: Option<SharedEventFormatter>,
}

impl SenderShared {
    fn append(&self, record: EventRecord) -> Result<(), HandlerError> {
        let serialised = record.to_wire_json(self.formatter.as_ref().map(|f| f.as_dyn()))?;
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(HandlerError::Closed);
        }
        pending.push(record, &serialised);
        let rejected = if self.triggers.is_due(pending.len(), pending.bytes()) {
            self.flush_locked(&mut pending)
        } else {
            None
        };
        drop(pending);
        self.report(rejected);
        Ok(())
    }

    fn flush(&self) {
        let mut pending = self.pending.lock();
        let rejected = self.flush_locked(&mut pending);
        drop(pending);
        self.report(rejected);
    }

    /// Refuse further appends and send whatever is pending. Returns `false`
    /// when the sender was already closed.
    fn close(&self) -> bool {
        let mut pending = self.pending.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let rejected = self.flush_locked(&mut pending);
        drop(pending);
        self.report(rejected);
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    fn flush_locked(&self, pending: &mut PendingBatch) -> Option<SendFailure> {
        let batch = pending.take()?;
        self.dispatcher.dispatch(&self.core, batch)
    }

    fn report(&self, rejected: Option<SendFailure>) {
        if let Some(failure) = rejected {
            self.core.report(failure);
        }
    }
}

struct FlushTimer {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushTimer {
    fn start(shared: Arc<SenderShared>, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = bounded::<()>(0);
        let ticker = tick(interval);
        let handle = thread::Builder::new()
            .name("logfwd-http-timer".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(stopped) -> _ => break,
                        recv(ticker) -> _ => shared.flush(),
                    }
                }
            })?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            warn!("HttpEventSender: flush timer thread panicked");
        }
    }
}

/// Batching sender for an HTTP event collector.
///
/// `send` appends to the pending batch and, when a count or byte threshold
/// is reached, hands the batch to a background worker before returning.
/// Delivery results never reach the producer; terminal failures go to the
/// observers registered with [`add_error_handler`](Self::add_error_handler).
pub struct HttpEventSender {
    shared: Arc<SenderShared>,
    timer: Mutex<Option<FlushTimer>>,
    shutdown_timeout: Duration,
}

impl HttpEventSender {
    /// Construct a sender that posts with the built-in HTTP transport.
    pub fn new(config: HttpSenderConfig) -> io::Result<Self> {
        let transport = Arc::new(UreqTransport::new(&config.transport));
        Self::with_transport(config, transport)
    }

    /// Construct a sender over a caller-supplied transport.
    pub fn with_transport(
        config: HttpSenderConfig,
        transport: Arc<dyn BatchTransport>,
    ) -> io::Result<Self> {
        let HttpSenderConfig {
            token,
            metadata,
            batch,
            send_mode,
            shutdown_timeout,
            middleware,
            formatter,
            ..
        } = config;
        let triggers = batch.triggers();
        let core = Arc::new(SenderCore::new(token, transport, middleware));
        let dispatcher = Dispatcher::start(send_mode, &core)?;
        let shared = Arc::new(SenderShared {
            core,
            dispatcher,
            pending: Mutex::new(PendingBatch::default()),
            triggers,
            metadata,
            formatter,
            closed: AtomicBool::new(false),
        });
        let timer = match triggers.interval {
            Some(interval) => Some(FlushTimer::start(Arc::clone(&shared), interval)?),
            None => None,
        };
        Ok(Self {
            shared,
            timer: Mutex::new(timer),
            shutdown_timeout,
        })
    }

    /// Register an observer for batches that could not be delivered.
    pub fn add_error_handler<F>(&self, handler: F)
    where
        F: Fn(&SendFailure) + Send + Sync + 'static,
    {
        self.shared.core.add_error_handler(Arc::new(handler));
    }

    /// Stamp a new event with the current time and the configured metadata
    /// and append it to the pending batch.
    pub fn send(
        &self,
        id: Option<&str>,
        severity: Option<&str>,
        message: Option<&str>,
        data: Option<Value>,
    ) -> Result<(), HandlerError> {
        let mut record = EventRecord::new().with_metadata(self.shared.metadata.clone());
        if let Some(id) = id {
            record = record.with_id(id);
        }
        if let Some(severity) = severity {
            record = record.with_severity(severity);
        }
        if let Some(message) = message {
            record = record.with_message(message);
        }
        if let Some(data) = data {
            record = record.with_data_value(data);
        }
        self.send_record(record)
    }

    /// Like [`send`](Self::send) with a serialisable data payload.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Serialise`] when `data` cannot be expressed as
    /// JSON; nothing is queued in that case.
    pub fn send_data<T>(
        &self,
        severity: Option<&str>,
        message: Option<&str>,
        data: &T,
    ) -> Result<(), HandlerError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(data)?;
        self.send(None, severity, message, Some(value))
    }

    /// Append a caller-built record, keeping its timestamp. Records without
    /// metadata of their own receive the configured metadata.
    pub fn send_record(&self, record: EventRecord) -> Result<(), HandlerError> {
        if self.shared.is_closed() {
            return Err(HandlerError::Closed);
        }
        let record = if record.metadata().is_empty() && !self.shared.metadata.is_empty() {
            record.with_metadata(self.shared.metadata.clone())
        } else {
            record
        };
        self.shared.append(record)
    }

    /// Send whatever is pending, regardless of thresholds.
    pub fn flush(&self) {
        self.shared.flush();
    }

    /// Flush, then block until every in-flight batch, retries included, has
    /// completed.
    pub fn flush_and_wait(&self) {
        self.flush();
        while self.shared.core.in_flight() > 0 {
            thread::sleep(FLUSH_POLL_INTERVAL);
        }
    }

    /// Flush and wait at most `timeout`. Returns `true` when nothing is left
    /// in flight.
    pub fn flush_and_wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.flush();
        loop {
            if self.shared.core.in_flight() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(remaining.min(FLUSH_POLL_INTERVAL));
        }
    }

    /// Number of batches currently being delivered or queued for delivery.
    pub fn in_flight(&self) -> usize {
        self.shared.core.in_flight()
    }

    /// Refuse new records, stop the flush timer, flush, and wait up to the
    /// shutdown timeout.
    ///
    /// A record either lands in the final flush or is rejected with
    /// [`HandlerError::Closed`]. Requests still running after the timeout are
    /// left to finish in the background; they are never aborted.
    pub fn close(&self) {
        if !self.shared.close() {
            return;
        }
        if let Some(timer) = self.timer.lock().take() {
            timer.stop();
        }
        let drained = self.flush_and_wait_timeout(self.shutdown_timeout);
        if !drained {
            warn!(
                "HttpEventSender: {} batches still in flight after {:?}",
                self.in_flight(),
                self.shutdown_timeout
            );
        }
        self.shared.dispatcher.shutdown(drained);
    }
}

impl EventHandler for HttpEventSender {
    fn handle(&self, record: &EventRecord) -> Result<(), HandlerError> {
        self.send_record(record.clone())
    }

    fn flush(&self) -> bool {
        self.flush_and_wait_timeout(self.shutdown_timeout)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for HttpEventSender {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for HttpEventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEventSender")
            .field("triggers", &self.shared.triggers)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}
