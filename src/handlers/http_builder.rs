//! Builder for [`HttpEventSender`](crate::http_sender::HttpEventSender).
//!
//! Exposes the collector endpoint, authentication, metadata, batching knobs,
//! timeouts, retry budget and custom middleware.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    event_record::{EventMetadata, SharedEventFormatter},
    http_sender::{
        BatchConfig, DEFAULT_SHUTDOWN_TIMEOUT, HttpEventSender, HttpSenderConfig, SendFailure,
        SendFailureCallback, SendMode,
    },
    http_transport::{DEFAULT_AUTH_SCHEME, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT},
    middleware::{MiddlewarePipeline, ResendMiddleware, SendMiddleware},
};

use super::{
    HandlerBuildError, HandlerBuilderTrait,
    builder_macros::{ensure_positive, option_setter},
};

/// Builder for constructing [`HttpEventSender`] instances.
#[derive(Clone, Default)]
pub struct HttpSenderBuilder {
    endpoint: Option<String>,
    token: Option<String>,
    auth_scheme: Option<String>,
    metadata: EventMetadata,
    batch: BatchConfig,
    send_mode: SendMode,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    shutdown_timeout_ms: Option<u64>,
    retries: Option<u32>,
    middleware: MiddlewarePipeline,
    formatter: Option<SharedEventFormatter>,
    error_handlers: Vec<SendFailureCallback>,
}

impl HttpSenderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URI of the collector (required).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Collector token (required).
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Scheme placed before the token in the `Authorization` header.
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = Some(scheme.into());
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Periodic forced flush in milliseconds; zero disables it.
    pub fn with_batch_interval_ms(mut self, interval_ms: u64) -> Self {
        self.batch.interval_ms = interval_ms;
        self
    }

    /// Flush once the serialised batch reaches this many bytes; zero leaves
    /// the byte size unbounded.
    pub fn with_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.batch.size_bytes = bytes;
        self
    }

    /// Flush once the batch holds this many events; zero leaves the count
    /// unbounded.
    pub fn with_batch_size_count(mut self, count: usize) -> Self {
        self.batch.size_count = count;
        self
    }

    pub fn with_send_mode(mut self, mode: SendMode) -> Self {
        self.send_mode = mode;
        self
    }

    option_setter!(
        /// Set the connect timeout in milliseconds.
        with_connect_timeout_ms,
        connect_timeout_ms,
        u64
    );
    option_setter!(
        /// Set the per-request timeout in milliseconds.
        with_request_timeout_ms,
        request_timeout_ms,
        u64
    );
    option_setter!(
        /// Set how long `close` waits for in-flight batches.
        with_shutdown_timeout_ms,
        shutdown_timeout_ms,
        u64
    );
    option_setter!(
        /// Retry each failed batch up to this many times before reporting it.
        with_retries,
        retries,
        u32
    );

    /// Append a middleware unit. Units run in the order added, outside the
    /// retry unit installed by [`with_retries`](Self::with_retries).
    pub fn with_middleware<M>(mut self, middleware: M) -> Self
    where
        M: SendMiddleware + 'static,
    {
        self.middleware = self.middleware.with(middleware);
        self
    }

    pub fn with_formatter(mut self, formatter: SharedEventFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Register an observer for batches that could not be delivered.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SendFailure) + Send + Sync + 'static,
    {
        self.error_handlers.push(Arc::new(handler));
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.validate_required()?;
        self.validate_timeouts()?;
        Ok(())
    }

    fn validate_required(&self) -> Result<(), HandlerBuildError> {
        match &self.endpoint {
            None => {
                return Err(HandlerBuildError::InvalidConfig(
                    "HTTP sender requires an endpoint".into(),
                ));
            }
            Some(endpoint) if endpoint.trim().is_empty() => {
                return Err(HandlerBuildError::InvalidConfig(
                    "endpoint must not be empty".into(),
                ));
            }
            Some(endpoint)
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") =>
            {
                return Err(HandlerBuildError::InvalidConfig(format!(
                    "endpoint must be an http(s) URI: {endpoint}"
                )));
            }
            Some(_) => {}
        }
        if self.token.as_deref().is_none_or(|token| token.trim().is_empty()) {
            return Err(HandlerBuildError::InvalidConfig(
                "HTTP sender requires a token".into(),
            ));
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), HandlerBuildError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.request_timeout_ms {
            ensure_positive!(timeout, "request_timeout_ms")?;
        }
        Ok(())
    }

    /// Validate and produce the sender configuration.
    pub fn build_config(&self) -> Result<HttpSenderConfig, HandlerBuildError> {
        self.validate()?;
        let mut config = HttpSenderConfig::new(
            self.endpoint.clone().unwrap_or_default(),
            self.token.clone().unwrap_or_default(),
        );
        config.transport.auth_scheme = self
            .auth_scheme
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTH_SCHEME.to_owned());
        config.transport.connect_timeout = self
            .connect_timeout_ms
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis);
        config.transport.request_timeout = self
            .request_timeout_ms
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis);
        config.shutdown_timeout = self
            .shutdown_timeout_ms
            .map_or(DEFAULT_SHUTDOWN_TIMEOUT, Duration::from_millis);
        config.metadata = self.metadata.clone();
        config.batch = self.batch;
        config.send_mode = self.send_mode;
        config.formatter = self.formatter.clone();
        config.middleware = match self.retries {
            Some(retries) => self.middleware.clone().with(ResendMiddleware::new(retries)),
            None => self.middleware.clone(),
        };
        Ok(config)
    }
}

impl HandlerBuilderTrait for HttpSenderBuilder {
    type Handler = HttpEventSender;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        let sender = HttpEventSender::new(self.build_config()?)?;
        for handler in &self.error_handlers {
            let handler = Arc::clone(handler);
            sender.add_error_handler(move |failure: &SendFailure| handler(failure));
        }
        Ok(sender)
    }
}

impl fmt::Debug for HttpSenderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSenderBuilder")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("metadata", &self.metadata)
            .field("batch", &self.batch)
            .field("send_mode", &self.send_mode)
            .field("retries", &self.retries)
            .field("middleware", &self.middleware)
            .field("error_handlers", &self.error_handlers.len())
            .finish_non_exhaustive()
    }
}
