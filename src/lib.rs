//! Client-side log forwarding to HTTP event collectors and raw TCP/UDP
//! endpoints.
//!
//! - [`HttpEventSender`] batches [`EventRecord`]s by count, bytes or time and
//!   posts them through a [`MiddlewarePipeline`] (usually carrying a
//!   [`ResendMiddleware`]) to `<base>/services/collector/event/1.0`.
//! - [`TcpLogHandler`] streams text lines through a [`TcpStreamWriter`] that
//!   queues while disconnected and reconnects per a [`ReconnectPolicy`].
//! - [`UdpLogHandler`] sends each line as one datagram.
//!
//! Producers never block on the network. Delivery failures reach the
//! callbacks registered on each sender or writer.

pub mod event_record;
pub mod handler;
pub mod handlers;
pub mod http_sender;
pub mod http_transport;
pub mod line_format;
pub mod middleware;
pub mod rate_limited_warner;
pub mod socket_handlers;
pub mod socket_transport;
pub mod tcp_writer;

pub use event_record::{
    DefaultEventFormatter, EventFormatter, EventMetadata, EventRecord, SharedEventFormatter,
    decode_events,
};
pub use handler::{EventHandler, HandlerError};
pub use handlers::{
    HandlerBuildError, HandlerBuilderTrait, HttpSenderBuilder, TcpHandlerBuilder,
    UdpHandlerBuilder,
};
pub use http_sender::{BatchConfig, HttpEventSender, HttpSenderConfig, SendFailure, SendMode};
pub use http_transport::{BatchTransport, PostResponse, TransportError, UreqTransport};
pub use line_format::{DefaultLineFormatter, LineFormatter, format_line};
pub use middleware::{MiddlewarePipeline, Next, ResendMiddleware, SendMiddleware, SendOutcome};
pub use socket_handlers::{TcpLogHandler, UdpLogHandler};
pub use socket_transport::{SocketTransport, TcpEndpoint, TlsOptions, UdpEndpoint};
pub use tcp_writer::{
    ConnectionState, ExponentialBackoff, FixedCapacityQueue, ReconnectError, ReconnectPolicy,
    TcpStreamWriter, TcpWriterConfig, TcpWriterError, TryOnce,
};
