//! Background delivery of flushed batches.
//!
//! [`SenderCore`] owns everything a delivery needs (token, transport,
//! middleware, error observers) and is shared with worker threads.
//! [`Dispatcher`] decides where a batch runs: on a fresh thread per flush, or
//! queued for a single sequential dispatcher thread.

use std::{
    io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::{
    http_transport::{BatchTransport, TransportError},
    middleware::MiddlewarePipeline,
};

use super::{
    batch::Batch,
    config::SendMode,
    failure::{SendFailure, SendFailureCallback},
};

pub(crate) struct SenderCore {
    token: String,
    transport: Arc<dyn BatchTransport>,
    pipeline: MiddlewarePipeline,
    error_handlers: RwLock<Vec<SendFailureCallback>>,
    in_flight: AtomicUsize,
}

impl SenderCore {
    pub(crate) fn new(
        token: String,
        transport: Arc<dyn BatchTransport>,
        pipeline: MiddlewarePipeline,
    ) -> Self {
        Self {
            token,
            transport,
            pipeline,
            error_handlers: RwLock::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn add_error_handler(&self, handler: SendFailureCallback) {
        self.error_handlers.write().push(handler);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one batch through the middleware chain and the transport.
    fn deliver(&self, batch: Batch) {
        let Batch { events, payload } = batch;
        let terminal = |token: &str| self.transport.post_batch(token, &payload);
        match self.pipeline.execute(&self.token, &events, &terminal) {
            Ok(response) if response.is_success() => {
                debug!("HttpEventSender delivered {} events", events.len());
            }
            Ok(response) => {
                self.report(SendFailure::rejected(response.status, response.body, events));
            }
            Err(err) => self.report(SendFailure::errored(err, events)),
        }
    }

    /// Notify every registered observer; observer panics are contained.
    pub(crate) fn report(&self, failure: SendFailure) {
        let handlers = self.error_handlers.read().clone();
        if handlers.is_empty() {
            warn!("HttpEventSender: {failure}");
            return;
        }
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&failure))).is_err() {
                warn!("HttpEventSender: error handler panicked while reporting: {failure}");
            }
        }
    }
}

/// Releases one in-flight slot when dropped.
struct InFlightRelease(Arc<SenderCore>);

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) enum Dispatcher {
    Parallel,
    Sequential {
        tx: Mutex<Option<Sender<Batch>>>,
        handle: Mutex<Option<JoinHandle<()>>>,
    },
}

impl Dispatcher {
    pub(crate) fn start(mode: SendMode, core: &Arc<SenderCore>) -> io::Result<Self> {
        match mode {
            SendMode::Parallel => Ok(Self::Parallel),
            SendMode::Sequential => {
                let (tx, rx) = unbounded();
                let worker_core = Arc::clone(core);
                let handle = thread::Builder::new()
                    .name("logfwd-http-dispatch".into())
                    .spawn(move || sequential_loop(rx, worker_core))?;
                Ok(Self::Sequential {
                    tx: Mutex::new(Some(tx)),
                    handle: Mutex::new(Some(handle)),
                })
            }
        }
    }

    /// Hand `batch` to a background worker without blocking on I/O.
    ///
    /// A batch that cannot be started comes back as a failure for the caller
    /// to report once it has released any locks of its own.
    #[must_use]
    pub(crate) fn dispatch(&self, core: &Arc<SenderCore>, batch: Batch) -> Option<SendFailure> {
        core.in_flight.fetch_add(1, Ordering::SeqCst);
        let (batch, err) = match self {
            Self::Parallel => spawn_delivery(core, batch)?,
            Self::Sequential { tx, .. } => {
                let rejected = match tx.lock().as_ref() {
                    Some(tx) => tx.send(batch).err().map(|err| err.into_inner()),
                    None => Some(batch),
                }?;
                (
                    rejected,
                    io::Error::other("sequential dispatcher has stopped"),
                )
            }
        };
        core.in_flight.fetch_sub(1, Ordering::SeqCst);
        Some(SendFailure::errored(
            TransportError::Spawn(err),
            batch.into_events(),
        ))
    }

    /// Stop accepting batches. When `join` is set, wait for the sequential
    /// dispatcher to drain its queue.
    pub(crate) fn shutdown(&self, join: bool) {
        let Self::Sequential { tx, handle } = self else {
            return;
        };
        tx.lock().take();
        let Some(handle) = handle.lock().take() else {
            return;
        };
        if join && handle.join().is_err() {
            warn!("HttpEventSender: dispatcher thread panicked");
        }
    }
}

/// Start a delivery thread; on spawn failure the batch is handed back.
fn spawn_delivery(core: &Arc<SenderCore>, batch: Batch) -> Option<(Batch, io::Error)> {
    let slot = Arc::new(Mutex::new(Some(batch)));
    let worker_slot = Arc::clone(&slot);
    let worker_core = Arc::clone(core);
    let spawned = thread::Builder::new()
        .name("logfwd-http-send".into())
        .spawn(move || {
            let release = InFlightRelease(worker_core);
            if let Some(batch) = worker_slot.lock().take() {
                release.0.deliver(batch);
            }
        });
    let err = spawned.err()?;
    let batch = slot.lock().take()?;
    Some((batch, err))
}

fn sequential_loop(rx: Receiver<Batch>, core: Arc<SenderCore>) {
    for batch in rx {
        let release = InFlightRelease(Arc::clone(&core));
        release.0.deliver(batch);
    }
}
