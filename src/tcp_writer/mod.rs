//! Queue-decoupled TCP streaming with reconnection.
//!
//! [`TcpStreamWriter`] separates producers from a fallible socket. Producers
//! push pre-formatted strings into a [`FixedCapacityQueue`]; one background
//! thread drains it over a [`SocketTransport`](crate::socket_transport::SocketTransport)
//! and, when a send fails, hands control to a [`ReconnectPolicy`] until a new
//! connection exists, the writer is disposed, or the policy gives up.
//!
//! ```text
//! Connecting ──▶ Connected ◀──▶ DisconnectedAwaitingReconnect
//!      └──────────────┴──────────────┴──▶ Disposed
//! ```
//!
//! Overflow while disconnected evicts the oldest entries silently; a
//! rate-limited warning summarises the evictions. A policy that gives up is
//! reported once through the failure handler and stops the writer for good.

mod cancellation;
mod config;
mod queue;
mod reconnect;
mod state;
mod writer;


pub use cancellation::{CancellationSource, CancellationToken, cancellation_pair};
pub use config::{DEFAULT_QUEUE_CAPACITY, TcpFailureHandler, TcpWriterConfig, TcpWriterError};
pub use queue::FixedCapacityQueue;
pub use reconnect::{
    ConnectFn, DEFAULT_RECONNECT_CEILING, DEFAULT_RECONNECT_UNIT, ExponentialBackoff,
    ReconnectError, ReconnectPolicy, TryOnce,
};
pub use state::ConnectionState;
pub use writer::TcpStreamWriter;
