//! Request interceptors wrapping the terminal collector POST.
//!
//! A [`MiddlewarePipeline`] is an ordered list of [`SendMiddleware`] units.
//! Each unit receives the token, the records of the batch being sent and a
//! [`Next`] handle. Calling [`Next::run`] invokes the following unit, or the
//! terminal transport call once the chain is exhausted. A unit may call
//! `next` several times (the resend policy does) or not at all.

mod resend;

use std::{fmt, sync::Arc};

pub use resend::{
    APPLICATION_ERROR_STATUSES, DEFAULT_INITIAL_RESEND_DELAY, DEFAULT_MAX_RESEND_DELAY,
    ResendMiddleware, ResponseClass, classify_outcome, classify_status,
};

use crate::{
    event_record::EventRecord,
    http_transport::{PostResponse, TransportError},
};

/// Result of one pass through the pipeline.
pub type SendOutcome = Result<PostResponse, TransportError>;

/// One pluggable unit of the pipeline.
pub trait SendMiddleware: Send + Sync {
    fn send(&self, token: &str, events: &[EventRecord], next: Next<'_>) -> SendOutcome;
}

impl<F> SendMiddleware for F
where
    F: Fn(&str, &[EventRecord], Next<'_>) -> SendOutcome + Send + Sync,
{
    fn send(&self, token: &str, events: &[EventRecord], next: Next<'_>) -> SendOutcome {
        self(token, events, next)
    }
}

/// Handle to the remainder of the pipeline.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn SendMiddleware>],
    terminal: &'a dyn Fn(&str) -> SendOutcome,
}

impl Next<'_> {
    /// Invoke the rest of the chain.
    pub fn run(self, token: &str, events: &[EventRecord]) -> SendOutcome {
        match self.chain.split_first() {
            Some((head, rest)) => head.send(
                token,
                events,
                Next {
                    chain: rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(token),
        }
    }
}

/// Ordered chain of middleware units.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    chain: Vec<Arc<dyn SendMiddleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit; units run in insertion order.
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: SendMiddleware + 'static,
    {
        self.chain.push(Arc::new(middleware));
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn SendMiddleware>) {
        self.chain.push(middleware);
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Run the chain around `terminal`. With no units this is a direct call.
    pub fn execute(
        &self,
        token: &str,
        events: &[EventRecord],
        terminal: &dyn Fn(&str) -> SendOutcome,
    ) -> SendOutcome {
        Next {
            chain: &self.chain,
            terminal,
        }
        .run(token, events)
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("len", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use rstest::rstest;

    use super::*;

    fn ok_terminal(token: &str) -> SendOutcome {
        Ok(PostResponse::new(200, token))
    }

    #[rstest]
    fn empty_pipeline_calls_terminal_directly() {
        let pipeline = MiddlewarePipeline::new();
        let outcome = pipeline.execute("abc", &[], &ok_terminal).expect("outcome");
        assert_eq!(outcome.body, "abc");
    }

    #[rstest]
    fn units_run_in_insertion_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&trace);
        let second = Arc::clone(&trace);
        let pipeline = MiddlewarePipeline::new()
            .with(move |token: &str, events: &[EventRecord], next: Next<'_>| {
                first.lock().push("first");
                next.run(token, events)
            })
            .with(move |token: &str, events: &[EventRecord], next: Next<'_>| {
                second.lock().push("second");
                next.run(token, events)
            });

        pipeline.execute("t", &[], &ok_terminal).expect("outcome");
        assert_eq!(*trace.lock(), vec!["first", "second"]);
    }

    #[rstest]
    fn unit_may_rewrite_token() {
        let pipeline = MiddlewarePipeline::new().with(
            |_token: &str, events: &[EventRecord], next: Next<'_>| next.run("rotated", events),
        );
        let outcome = pipeline.execute("stale", &[], &ok_terminal).expect("outcome");
        assert_eq!(outcome.body, "rotated");
    }

    #[rstest]
    fn unit_may_short_circuit() {
        let calls = AtomicUsize::new(0);
        let terminal = |_: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            ok_terminal("never")
        };
        let pipeline = MiddlewarePipeline::new().with(
            |_token: &str, _events: &[EventRecord], _next: Next<'_>| {
                Ok(PostResponse::new(403, "blocked"))
            },
        );
        let outcome = pipeline.execute("t", &[], &terminal).expect("outcome");
        assert_eq!(outcome.status, 403);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
