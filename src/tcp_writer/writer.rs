//! The writer handle and its background send loop.

use std::{
    fmt, io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::select;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    handler::HandlerError, rate_limited_warner::RateLimitedWarner,
    socket_transport::{ShutdownHandle, SocketTransport},
};

use super::{
    cancellation::{CancellationSource, CancellationToken, cancellation_pair},
    config::{TcpFailureHandler, TcpWriterConfig, TcpWriterError},
    queue::FixedCapacityQueue,
    reconnect::ReconnectPolicy,
    state::{ConnectionState, SharedState},
};

type Connector = Box<dyn FnMut() -> io::Result<Box<dyn SocketTransport>> + Send>;

/// Shutdown handle of the connection the worker is currently using.
type LiveConnection = Arc<Mutex<Option<ShutdownHandle>>>;

/// Streams pre-formatted entries over a reconnecting socket.
///
/// [`enqueue`](Self::enqueue) never touches the network: entries land in a
/// bounded queue drained by one background thread. While the connection is
/// down the queue keeps the newest `queue_capacity` entries and silently
/// evicts older ones. After reconnecting, the entry whose send failed goes
/// out first, followed by the queue in enqueue order.
///
/// [`dispose`](Self::dispose) cancels any reconnect wait, shuts the live
/// socket down (waking a write blocked on a stalled peer), stops the thread
/// and discards whatever is still queued.
pub struct TcpStreamWriter {
    queue: Arc<FixedCapacityQueue<String>>,
    state: Arc<SharedState>,
    cancel: CancellationSource,
    live: LiveConnection,
    handle: Mutex<Option<JoinHandle<()>>>,
    evictions: RateLimitedWarner,
}

impl TcpStreamWriter {
    /// Start the background loop. The first connection is made on that
    /// thread through the configured reconnect policy.
    pub fn new<C>(config: TcpWriterConfig, connect: C) -> io::Result<Self>
    where
        C: FnMut() -> io::Result<Box<dyn SocketTransport>> + Send + 'static,
    {
        let TcpWriterConfig {
            queue_capacity,
            reconnect_policy,
            failure_handler,
        } = config;
        let queue = Arc::new(FixedCapacityQueue::new(queue_capacity));
        let state = Arc::new(SharedState::new());
        let (cancel, token) = cancellation_pair();
        let live = LiveConnection::default();
        let worker = Worker {
            queue: Arc::clone(&queue),
            state: Arc::clone(&state),
            cancel: token,
            live: Arc::clone(&live),
            policy: reconnect_policy,
            connect: Box::new(connect),
            failure_handler,
        };
        let handle = thread::Builder::new()
            .name("logfwd-tcp-writer".into())
            .spawn(move || worker.run())?;
        Ok(Self {
            queue,
            state,
            cancel,
            live,
            handle: Mutex::new(Some(handle)),
            evictions: RateLimitedWarner::default(),
        })
    }

    /// Queue `entry` for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Closed`] once the writer is disposed or has
    /// stopped after its reconnect policy gave up.
    pub fn enqueue(&self, entry: impl Into<String>) -> Result<(), HandlerError> {
        if self.state.get() == ConnectionState::Disposed {
            return Err(HandlerError::Closed);
        }
        let evicted = self.queue.push(entry.into());
        if evicted > 0 {
            for _ in 0..evicted {
                self.evictions.record_drop();
            }
            self.evictions.warn_if_due(|count| {
                warn!("TcpStreamWriter queue full; evicted {count} oldest entries");
            });
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Entries waiting for the background loop.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Entries evicted by queue overflow since construction.
    pub fn evicted(&self) -> u64 {
        self.evictions.total_dropped()
    }

    /// Stop the background loop and close the socket. Idempotent.
    pub fn dispose(&self) {
        self.state.dispose();
        self.cancel.cancel();
        // The worker publishes the handle before moving to Connected, so a
        // connection made after this point is refused and closed by the worker.
        if let Some(shutdown) = self.live.lock().take() {
            shutdown();
        }
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("TcpStreamWriter: worker thread panicked");
        }
        self.evictions.flush(|count| {
            warn!("TcpStreamWriter evicted {count} entries before shutdown");
        });
    }
}

impl Drop for TcpStreamWriter {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for TcpStreamWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStreamWriter")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("capacity", &self.queue.capacity())
            .finish()
    }
}

struct Worker {
    queue: Arc<FixedCapacityQueue<String>>,
    state: Arc<SharedState>,
    cancel: CancellationToken,
    live: LiveConnection,
    policy: Box<dyn ReconnectPolicy>,
    connect: Connector,
    failure_handler: Option<TcpFailureHandler>,
}

impl Worker {
    fn run(mut self) {
        let Some(mut connection) = self.establish() else {
            return;
        };
        let mut retry: Option<String> = None;
        while let Some(entry) = retry.take().or_else(|| self.next_entry()) {
            if let Err(err) = connection.send(entry.as_bytes()) {
                self.release(&mut *connection);
                if self.cancel.is_cancelled() {
                    debug!("TcpStreamWriter send interrupted by dispose: {err}");
                    return;
                }
                warn!("TcpStreamWriter send failed: {err}");
                self.report(&TcpWriterError::Send(err));
                retry = Some(entry);
                if !self
                    .state
                    .transition(ConnectionState::DisconnectedAwaitingReconnect)
                {
                    return;
                }
                match self.establish() {
                    Some(fresh) => connection = fresh,
                    None => return,
                }
            }
        }
        self.release(&mut *connection);
        debug!("TcpStreamWriter worker exiting");
    }

    fn release(&self, connection: &mut dyn SocketTransport) {
        self.live.lock().take();
        connection.close();
    }

    /// Oldest queued entry, or `None` once cancelled.
    fn next_entry(&self) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }
        select! {
            recv(self.queue.receiver()) -> entry => entry.ok(),
            recv(self.cancel.receiver()) -> _ => None,
        }
    }

    /// Run the reconnect policy. `None` means the loop must stop.
    fn establish(&mut self) -> Option<Box<dyn SocketTransport>> {
        match self.policy.reconnect(&mut *self.connect, &self.cancel) {
            Ok(Some(mut connection)) => {
                *self.live.lock() = connection.shutdown_handle();
                if self.state.transition(ConnectionState::Connected) {
                    Some(connection)
                } else {
                    self.release(&mut *connection);
                    None
                }
            }
            Ok(None) => None,
            Err(err) => {
                warn!("TcpStreamWriter stopped: {err}");
                self.state.dispose();
                self.report(&TcpWriterError::ReconnectExhausted(err));
                None
            }
        }
    }

    fn report(&self, error: &TcpWriterError) {
        let Some(handler) = &self.failure_handler else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
            warn!("TcpStreamWriter: failure handler panicked while reporting: {error}");
        }
    }
}
