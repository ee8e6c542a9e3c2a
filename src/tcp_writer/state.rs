//! Connection state shared between the writer handle and its worker.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Establishing the first connection.
    Connecting,
    Connected,
    /// A send failed; the reconnect policy is running.
    DisconnectedAwaitingReconnect,
    /// Terminal.
    Disposed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Connected => 1,
            Self::DisconnectedAwaitingReconnect => 2,
            Self::Disposed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::DisconnectedAwaitingReconnect,
            _ => Self::Disposed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Connecting.as_u8()))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move to `next` unless already disposed. Returns `false` when the
    /// transition was refused.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let disposed = ConnectionState::Disposed.as_u8();
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != disposed).then_some(next.as_u8())
            })
            .is_ok()
    }

    pub(crate) fn dispose(&self) {
        self.0
            .store(ConnectionState::Disposed.as_u8(), Ordering::SeqCst);
    }
}
