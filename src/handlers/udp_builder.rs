//! Builder for [`UdpLogHandler`](crate::socket_handlers::UdpLogHandler).

use std::{fmt, io, sync::Arc};

use crate::{
    line_format::{DefaultLineFormatter, SharedLineFormatter},
    socket_handlers::{UdpFailureHandler, UdpLogHandler},
    socket_transport::UdpEndpoint,
};

use super::{HandlerBuildError, HandlerBuilderTrait, builder_macros::ensure_positive};

/// Builder for constructing [`UdpLogHandler`] instances.
#[derive(Clone, Default)]
pub struct UdpHandlerBuilder {
    host: Option<String>,
    port: Option<u16>,
    formatter: Option<SharedLineFormatter>,
    failure_handler: Option<UdpFailureHandler>,
}

impl UdpHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target host and port (required).
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    pub fn with_formatter(mut self, formatter: SharedLineFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Observe datagrams that could not be sent.
    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&io::Error) + Send + Sync + 'static,
    {
        self.failure_handler = Some(Arc::new(handler));
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) if !host.trim().is_empty() => {
                ensure_positive!(port, "port")?;
                Ok(())
            }
            _ => Err(HandlerBuildError::InvalidConfig(
                "UDP handler requires a host and port".into(),
            )),
        }
    }
}

impl HandlerBuilderTrait for UdpHandlerBuilder {
    type Handler = UdpLogHandler;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        self.validate()?;
        let endpoint = UdpEndpoint::new(
            self.host.clone().unwrap_or_default(),
            self.port.unwrap_or_default(),
        );
        let formatter = self
            .formatter
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultLineFormatter) as SharedLineFormatter);
        Ok(UdpLogHandler::new(
            &endpoint,
            formatter,
            self.failure_handler.clone(),
        )?)
    }
}

impl fmt::Debug for UdpHandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpHandlerBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
