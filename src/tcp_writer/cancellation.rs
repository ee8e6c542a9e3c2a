//! One-shot cancellation signal for the writer's background loop.
//!
//! The signal is the disconnection of a channel nobody ever sends on:
//! dropping the [`CancellationSource`]'s sender wakes every blocked
//! [`CancellationToken::wait`] and every `select!` over
//! [`CancellationToken::receiver`] at once.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

/// Create a linked source and token.
pub fn cancellation_pair() -> (CancellationSource, CancellationToken) {
    let (tx, rx) = bounded(0);
    (
        CancellationSource {
            tx: Mutex::new(Some(tx)),
        },
        CancellationToken { rx },
    )
}

#[derive(Debug)]
pub struct CancellationSource {
    tx: Mutex<Option<Sender<()>>>,
}

impl CancellationSource {
    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.lock().take();
    }
}

#[derive(Clone, Debug)]
pub struct CancellationToken {
    rx: Receiver<()>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep for `delay` or until cancelled. Returns `true` when cancelled.
    pub fn wait(&self, delay: Duration) -> bool {
        !matches!(self.rx.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
    }

    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
