//! Strategies for re-establishing a dropped connection.
//!
//! A [`ReconnectPolicy`] blocks the writer's worker until it has a live
//! transport, observes cancellation (`Ok(None)`), or gives up for good
//! (`Err(ReconnectError::GaveUp)`). Producers are never blocked by it.

use std::{io, time::Duration};

use log::{debug, warn};
use thiserror::Error;

use crate::socket_transport::SocketTransport;

use super::cancellation::CancellationToken;

/// Base unit of the exponential schedule.
pub const DEFAULT_RECONNECT_UNIT: Duration = Duration::from_secs(1);
/// Upper bound on a single reconnect wait.
pub const DEFAULT_RECONNECT_CEILING: Duration = Duration::from_secs(600);

/// Opens a fresh transport.
pub type ConnectFn<'a> = dyn FnMut() -> io::Result<Box<dyn SocketTransport>> + 'a;

#[derive(Debug, Error)]
pub enum ReconnectError {
    /// The policy stopped trying; carries the last connection error.
    #[error("gave up reconnecting: {0}")]
    GaveUp(#[source] io::Error),
}

pub trait ReconnectPolicy: Send {
    /// Block until `connect` succeeds, `cancel` fires, or the policy gives up.
    fn reconnect(
        &mut self,
        connect: &mut ConnectFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SocketTransport>>, ReconnectError>;
}

/// Retries forever. The first attempt is immediate; the wait after failed
/// attempt `n` (zero-based) is `min(ceiling, (2^(n+1) - 1) * unit)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub unit: Duration,
    pub ceiling: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            unit: DEFAULT_RECONNECT_UNIT,
            ceiling: DEFAULT_RECONNECT_CEILING,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(unit: Duration, ceiling: Duration) -> Self {
        Self { unit, ceiling }
    }

    /// Wait following failed attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = attempt
            .checked_add(1)
            .and_then(|exp| 2u32.checked_pow(exp))
            .map(|power| power - 1);
        factor
            .and_then(|factor| self.unit.checked_mul(factor))
            .map_or(self.ceiling, |delay| delay.min(self.ceiling))
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn reconnect(
        &mut self,
        connect: &mut ConnectFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SocketTransport>>, ReconnectError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            match connect() {
                Ok(transport) => {
                    debug!("TcpStreamWriter connected after {} failed attempts", attempt);
                    return Ok(Some(transport));
                }
                Err(err) => {
                    let delay = self.delay(attempt);
                    warn!(
                        "TcpStreamWriter connect attempt {} failed: {err}; retrying in {delay:?}",
                        attempt + 1
                    );
                    if cancel.wait(delay) {
                        return Ok(None);
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

/// Makes a single attempt and gives up on failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TryOnce;

impl ReconnectPolicy for TryOnce {
    fn reconnect(
        &mut self,
        connect: &mut ConnectFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SocketTransport>>, ReconnectError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        connect().map(Some).map_err(ReconnectError::GaveUp)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use rstest::rstest;

    use super::*;
    use crate::tcp_writer::cancellation::cancellation_pair;

    struct Null;

    impl SocketTransport for Null {
        fn send(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn refused() -> io::Result<Box<dyn SocketTransport>> {
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 3)]
    #[case(2, 7)]
    #[case(3, 15)]
    #[case(8, 511)]
    #[case(9, 600)]
    #[case(40, 600)]
    fn delays_follow_the_doubling_schedule(#[case] attempt: u32, #[case] seconds: u64) {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.delay(attempt), Duration::from_secs(seconds));
    }

    #[rstest]
    fn backoff_retries_until_connect_succeeds() {
        let (_source, token) = cancellation_pair();
        let mut policy = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let mut attempts = 0;
        let mut connect = || {
            attempts += 1;
            if attempts < 4 {
                refused()
            } else {
                Ok(Box::new(Null) as Box<dyn SocketTransport>)
            }
        };
        let transport = policy.reconnect(&mut connect, &token).expect("no give up");
        assert!(transport.is_some());
        assert_eq!(attempts, 4);
    }

    #[rstest]
    fn backoff_returns_none_when_cancelled() {
        let (source, token) = cancellation_pair();
        let worker = thread::spawn(move || {
            let mut policy = ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(60));
            let started = Instant::now();
            let outcome = policy.reconnect(&mut refused, &token);
            (outcome.map(|t| t.is_none()).ok(), started.elapsed())
        });
        thread::sleep(Duration::from_millis(50));
        source.cancel();
        let (cancelled, waited) = worker.join().expect("worker");
        assert_eq!(cancelled, Some(true));
        assert!(waited < Duration::from_secs(5));
    }

    #[rstest]
    fn try_once_gives_up_after_one_attempt() {
        let (_source, token) = cancellation_pair();
        let mut attempts = 0;
        let mut connect = || {
            attempts += 1;
            refused()
        };
        let outcome = TryOnce.reconnect(&mut connect, &token);
        assert!(matches!(outcome, Err(ReconnectError::GaveUp(_))));
        assert_eq!(attempts, 1);
    }

    #[rstest]
    fn try_once_skips_the_attempt_when_cancelled() {
        let (source, token) = cancellation_pair();
        source.cancel();
        let outcome = TryOnce.reconnect(&mut refused, &token);
        assert!(matches!(outcome, Ok(None)));
    }
}
