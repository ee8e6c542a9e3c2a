//! Resend-on-error middleware with exponential backoff.
//!
//! Outcomes are classified as follows:
//!
//! - **200**: success, stop.
//! - **400, 403, 405**: application error, stop without retrying.
//! - **Any other status or a network error**: retryable.
//!
//! Retries wait 1 s, 2 s, 4 s, ... capped at 60 s, without jitter. With a
//! budget of `R` retries at most `R + 1` attempts are made; the last outcome
//! is returned unchanged once the budget is spent.

use std::{thread, time::Duration};

use log::{debug, warn};

use crate::event_record::EventRecord;

use super::{Next, SendMiddleware, SendOutcome};

/// Statuses that indicate a malformed or unauthorised request.
pub const APPLICATION_ERROR_STATUSES: [u16; 3] = [400, 403, 405];
/// Delay before the first retry.
pub const DEFAULT_INITIAL_RESEND_DELAY: Duration = Duration::from_millis(1_000);
/// Upper bound on the delay between retries.
pub const DEFAULT_MAX_RESEND_DELAY: Duration = Duration::from_millis(60_000);

/// Classification of one attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Network error or a status other than success/application error.
    Retryable,
    /// The request itself is invalid; retrying cannot help.
    Application,
}

/// Classify a collector status code.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200 => ResponseClass::Success,
        s if APPLICATION_ERROR_STATUSES.contains(&s) => ResponseClass::Application,
        _ => ResponseClass::Retryable,
    }
}

/// Classify the outcome of an attempt; transport errors are retryable.
pub fn classify_outcome(outcome: &SendOutcome) -> ResponseClass {
    match outcome {
        Ok(response) => classify_status(response.status),
        Err(_) => ResponseClass::Retryable,
    }
}

/// Middleware that resends a batch on retryable failures.
#[derive(Clone, Debug)]
pub struct ResendMiddleware {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl ResendMiddleware {
    /// Retry up to `max_retries` times using the default delays.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: DEFAULT_INITIAL_RESEND_DELAY,
            max_delay: DEFAULT_MAX_RESEND_DELAY,
        }
    }

    /// Override the first delay and the cap.
    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The sequence of waits performed between attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_delay), move |delay| {
            Some(delay.saturating_mul(2).min(self.max_delay))
        })
        .take(self.max_retries as usize)
    }
}

impl SendMiddleware for ResendMiddleware {
    fn send(&self, token: &str, events: &[EventRecord], next: Next<'_>) -> SendOutcome {
        let mut delays = self.delays();
        let mut attempt = 1u32;
        loop {
            let outcome = next.run(token, events);
            match classify_outcome(&outcome) {
                ResponseClass::Success => return outcome,
                ResponseClass::Application => {
                    debug!("ResendMiddleware: application error on attempt {attempt}, not retrying");
                    return outcome;
                }
                ResponseClass::Retryable => {}
            }

            let Some(delay) = delays.next() else {
                warn!(
                    "ResendMiddleware: giving up on batch of {} events after {attempt} attempts",
                    events.len()
                );
                return outcome;
            };
            match &outcome {
                Ok(response) => debug!(
                    "ResendMiddleware: attempt {attempt} returned status {}; retrying in {delay:?}",
                    response.status
                ),
                Err(err) => {
                    debug!("ResendMiddleware: attempt {attempt} failed: {err}; retrying in {delay:?}")
                }
            }
            thread::sleep(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;

    use super::*;
    use crate::{
        http_transport::{PostResponse, TransportError},
        middleware::MiddlewarePipeline,
    };

    fn fast(max_retries: u32) -> ResendMiddleware {
        ResendMiddleware::new(max_retries)
            .with_delays(Duration::from_millis(1), Duration::from_millis(4))
    }

    fn run_against(
        middleware: ResendMiddleware,
        outcomes: impl Fn(usize) -> SendOutcome,
    ) -> (SendOutcome, usize) {
        let calls = AtomicUsize::new(0);
        let terminal = |_: &str| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            outcomes(n)
        };
        let pipeline = MiddlewarePipeline::new().with(middleware);
        let outcome = pipeline.execute("token", &[], &terminal);
        (outcome, calls.load(Ordering::SeqCst))
    }

    #[rstest]
    #[case(200, ResponseClass::Success)]
    #[case(400, ResponseClass::Application)]
    #[case(403, ResponseClass::Application)]
    #[case(405, ResponseClass::Application)]
    #[case(401, ResponseClass::Retryable)]
    #[case(404, ResponseClass::Retryable)]
    #[case(429, ResponseClass::Retryable)]
    #[case(503, ResponseClass::Retryable)]
    #[case(204, ResponseClass::Retryable)]
    fn classifies_statuses(#[case] status: u16, #[case] expected: ResponseClass) {
        assert_eq!(classify_status(status), expected);
    }

    #[rstest]
    fn network_errors_are_retryable() {
        let outcome: SendOutcome = Err(TransportError::Network("reset".into()));
        assert_eq!(classify_outcome(&outcome), ResponseClass::Retryable);
    }

    #[rstest]
    fn default_delays_double_up_to_a_minute() {
        let delays: Vec<_> = ResendMiddleware::new(8).delays().map(|d| d.as_millis()).collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000, 60_000]
        );
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    fn always_failing_endpoint_sees_retries_plus_one_attempts(#[case] retries: u32) {
        let (outcome, calls) = run_against(fast(retries), |_| Ok(PostResponse::new(503, "busy")));
        assert_eq!(calls, retries as usize + 1);
        assert_eq!(outcome.expect("last response").status, 503);
    }

    #[rstest]
    fn network_failures_are_retried_and_last_error_returned() {
        let (outcome, calls) = run_against(fast(2), |n| {
            Err(TransportError::Network(format!("attempt {n}")))
        });
        assert_eq!(calls, 3);
        let err = outcome.expect_err("still failing");
        assert!(err.to_string().contains("attempt 2"));
    }

    #[rstest]
    #[case(400)]
    #[case(403)]
    #[case(405)]
    fn application_errors_are_not_retried(#[case] status: u16) {
        let (outcome, calls) = run_against(fast(5), |_| Ok(PostResponse::new(status, "bad")));
        assert_eq!(calls, 1);
        assert_eq!(outcome.expect("response").status, status);
    }

    #[rstest]
    fn stops_once_the_endpoint_recovers() {
        let (outcome, calls) = run_against(fast(5), |n| {
            if n < 2 {
                Ok(PostResponse::new(500, "down"))
            } else {
                Ok(PostResponse::new(200, "ok"))
            }
        });
        assert_eq!(calls, 3);
        assert!(outcome.expect("response").is_success());
    }
}
