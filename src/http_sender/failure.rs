//! Terminal failure reported to error callbacks.

use std::{error::Error, fmt, sync::Arc};

use crate::{event_record::EventRecord, http_transport::TransportError};

/// A batch that could not be delivered.
///
/// Either `status` (with the collector's `reply`) or `error` is set,
/// depending on whether a response was received at all.
#[derive(Debug)]
pub struct SendFailure {
    pub status: Option<u16>,
    pub error: Option<TransportError>,
    pub reply: Option<String>,
    pub events: Vec<EventRecord>,
}

impl SendFailure {
    pub(crate) fn rejected(status: u16, reply: String, events: Vec<EventRecord>) -> Self {
        Self {
            status: Some(status),
            error: None,
            reply: (!reply.is_empty()).then_some(reply),
            events,
        }
    }

    pub(crate) fn errored(error: TransportError, events: Vec<EventRecord>) -> Self {
        Self {
            status: None,
            error: Some(error),
            reply: None,
            events,
        }
    }
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to deliver {} events", self.events.len())?;
        if let Some(status) = self.status {
            write!(f, ": collector returned {status}")?;
        }
        if let Some(err) = &self.error {
            write!(f, ": {err}")?;
        }
        if let Some(reply) = &self.reply {
            write!(f, " ({reply})")?;
        }
        Ok(())
    }
}

impl Error for SendFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.as_ref().map(|err| err as &(dyn Error + 'static))
    }
}

/// Observer invoked once per undeliverable batch.
pub type SendFailureCallback = Arc<dyn Fn(&SendFailure) + Send + Sync>;
