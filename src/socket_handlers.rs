//! Line-oriented handlers over TCP and UDP.
//!
//! [`TcpLogHandler`] renders each record as a text line and hands it to a
//! [`TcpStreamWriter`], so producers never wait on the socket.
//! [`UdpLogHandler`] sends each line as one datagram directly from the
//! calling thread; a datagram send does not block on the peer.

use std::{
    any::Any,
    fmt, io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use delegate::delegate;
use log::warn;
use parking_lot::Mutex;

use crate::{
    event_record::EventRecord,
    handler::{EventHandler, HandlerError},
    line_format::{SharedLineFormatter, format_line, render_line},
    rate_limited_warner::RateLimitedWarner,
    socket_transport::{SocketTransport, TcpEndpoint, UdpConnection, UdpEndpoint},
    tcp_writer::{ConnectionState, TcpStreamWriter, TcpWriterConfig},
};

/// Streams text lines to a TCP endpoint through a reconnecting writer.
pub struct TcpLogHandler {
    writer: TcpStreamWriter,
    formatter: SharedLineFormatter,
}

impl TcpLogHandler {
    /// Start a writer that connects to `endpoint` on its own thread.
    pub fn new(
        endpoint: TcpEndpoint,
        config: TcpWriterConfig,
        formatter: SharedLineFormatter,
    ) -> io::Result<Self> {
        let connect = move || {
            endpoint
                .connect()
                .map(|connection| Box::new(connection) as Box<dyn SocketTransport>)
        };
        Ok(Self {
            writer: TcpStreamWriter::new(config, connect)?,
            formatter,
        })
    }

    /// Queue a plain message stamped with the current time.
    pub fn log(&self, message: &str) -> Result<(), HandlerError> {
        self.writer.enqueue(format_line(SystemTime::now(), message))
    }

    delegate! {
        to self.writer {
            pub fn state(&self) -> ConnectionState;
            /// Lines waiting to be written.
            pub fn queued(&self) -> usize;
            /// Lines lost to queue overflow.
            pub fn evicted(&self) -> u64;
            /// Stop the writer, discarding queued lines.
            pub fn dispose(&self);
        }
    }
}

impl EventHandler for TcpLogHandler {
    fn handle(&self, record: &EventRecord) -> Result<(), HandlerError> {
        self.writer
            .enqueue(render_line(self.formatter.as_ref(), record))
    }

    /// Reports whether the queue is empty on a live connection.
    fn flush(&self) -> bool {
        self.state() == ConnectionState::Connected && self.queued() == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for TcpLogHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpLogHandler")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

pub type UdpFailureHandler = Arc<dyn Fn(&io::Error) + Send + Sync>;

/// Sends one datagram per line. Nothing is queued or retried.
pub struct UdpLogHandler {
    connection: Mutex<UdpConnection>,
    formatter: SharedLineFormatter,
    failure_handler: Option<UdpFailureHandler>,
    warner: RateLimitedWarner,
    closed: AtomicBool,
}

impl UdpLogHandler {
    pub fn new(
        endpoint: &UdpEndpoint,
        formatter: SharedLineFormatter,
        failure_handler: Option<UdpFailureHandler>,
    ) -> io::Result<Self> {
        Ok(Self {
            connection: Mutex::new(endpoint.connect()?),
            formatter,
            failure_handler,
            warner: RateLimitedWarner::default(),
            closed: AtomicBool::new(false),
        })
    }

    /// Send a plain message stamped with the current time.
    pub fn log(&self, message: &str) -> Result<(), HandlerError> {
        self.send_line(&format_line(SystemTime::now(), message))
    }

    fn send_line(&self, line: &str) -> Result<(), HandlerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HandlerError::Closed);
        }
        let outcome = self.connection.lock().send(line.as_bytes());
        if let Err(err) = outcome {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                warn!("UdpLogHandler dropped {count} lines; last error: {err}");
            });
            if let Some(handler) = &self.failure_handler {
                if catch_unwind(AssertUnwindSafe(|| handler(&err))).is_err() {
                    warn!("UdpLogHandler: failure handler panicked while reporting: {err}");
                }
            }
        }
        Ok(())
    }

    /// Lines lost to send errors.
    pub fn dropped(&self) -> u64 {
        self.warner.total_dropped()
    }

    /// Release the socket. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connection.lock().close();
        self.warner.flush(|count| {
            warn!("UdpLogHandler dropped {count} lines before close");
        });
    }
}

impl EventHandler for UdpLogHandler {
    fn handle(&self, record: &EventRecord) -> Result<(), HandlerError> {
        self.send_line(&render_line(self.formatter.as_ref(), record))
    }

    /// Datagrams are unbuffered; there is nothing to flush.
    fn flush(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for UdpLogHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for UdpLogHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpLogHandler")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}
