//! Builder for [`TcpLogHandler`](crate::socket_handlers::TcpLogHandler).
//!
//! Exposes the endpoint, TLS, socket timeouts, queue capacity, reconnect
//! strategy and line formatting.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    line_format::{DefaultLineFormatter, SharedLineFormatter},
    socket_handlers::TcpLogHandler,
    socket_transport::{DEFAULT_CONNECT_TIMEOUT, TcpEndpoint, TlsOptions},
    tcp_writer::{
        DEFAULT_QUEUE_CAPACITY, ExponentialBackoff, ReconnectPolicy, TcpFailureHandler,
        TcpWriterConfig, TcpWriterError, TryOnce,
    },
};

use super::{
    HandlerBuildError, HandlerBuilderTrait,
    builder_macros::{ensure_positive, option_setter},
};

/// How the writer re-establishes a dropped connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectStrategy {
    /// Retry forever with waits of `min(ceiling, (2^(n+1) - 1) * unit)`.
    Exponential { unit_ms: u64, ceiling_ms: u64 },
    /// Give up after a single failed attempt.
    TryOnce,
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        let defaults = ExponentialBackoff::default();
        Self::Exponential {
            unit_ms: millis(defaults.unit),
            ceiling_ms: millis(defaults.ceiling),
        }
    }
}

impl ReconnectStrategy {
    fn validate(&self) -> Result<(), HandlerBuildError> {
        if let Self::Exponential {
            unit_ms,
            ceiling_ms,
        } = *self
        {
            ensure_positive!(unit_ms, "backoff_unit_ms")?;
            if ceiling_ms < unit_ms {
                return Err(HandlerBuildError::InvalidConfig(format!(
                    "backoff_ceiling_ms ({ceiling_ms}) must not be below backoff_unit_ms ({unit_ms})"
                )));
            }
        }
        Ok(())
    }

    fn policy(&self) -> Box<dyn ReconnectPolicy> {
        match *self {
            Self::Exponential {
                unit_ms,
                ceiling_ms,
            } => Box::new(ExponentialBackoff::new(
                Duration::from_millis(unit_ms),
                Duration::from_millis(ceiling_ms),
            )),
            Self::TryOnce => Box::new(TryOnce),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Clone, Debug, Default)]
struct TlsConfig {
    domain: Option<String>,
    insecure: bool,
}

/// Builder for constructing [`TcpLogHandler`] instances.
#[derive(Clone, Default)]
pub struct TcpHandlerBuilder {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<TlsConfig>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    queue_capacity: Option<usize>,
    reconnect: ReconnectStrategy,
    formatter: Option<SharedLineFormatter>,
    failure_handler: Option<TcpFailureHandler>,
}

impl TcpHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target host and port (required).
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Wrap the stream in TLS. The handshake domain defaults to the host.
    pub fn with_tls(mut self, domain: Option<String>, insecure: bool) -> Self {
        self.tls = Some(TlsConfig { domain, insecure });
        self
    }

    option_setter!(
        /// Set the connect timeout in milliseconds.
        with_connect_timeout_ms,
        connect_timeout_ms,
        u64
    );
    option_setter!(
        /// Set the socket write timeout in milliseconds.
        with_write_timeout_ms,
        write_timeout_ms,
        u64
    );
    option_setter!(
        /// Set how many lines are held while disconnected.
        with_queue_capacity,
        queue_capacity,
        usize
    );

    /// Reconnect with exponential backoff.
    pub fn with_backoff(mut self, unit_ms: u64, ceiling_ms: u64) -> Self {
        self.reconnect = ReconnectStrategy::Exponential {
            unit_ms,
            ceiling_ms,
        };
        self
    }

    /// Stop the writer after the first failed connection attempt.
    pub fn with_try_once(mut self) -> Self {
        self.reconnect = ReconnectStrategy::TryOnce;
        self
    }

    pub fn with_formatter(mut self, formatter: SharedLineFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TcpWriterError) + Send + Sync + 'static,
    {
        self.failure_handler = Some(Arc::new(handler));
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        match &self.host {
            None => {
                return Err(HandlerBuildError::InvalidConfig(
                    "TCP handler requires an address".into(),
                ));
            }
            Some(host) if host.trim().is_empty() => {
                return Err(HandlerBuildError::InvalidConfig(
                    "host must not be empty".into(),
                ));
            }
            Some(_) => {}
        }
        if let Some(port) = self.port {
            ensure_positive!(port, "port")?;
        }
        if let Some(capacity) = self.queue_capacity {
            ensure_positive!(capacity, "queue_capacity")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        self.reconnect.validate()
    }

    fn build_endpoint(&self) -> TcpEndpoint {
        let host = self.host.clone().unwrap_or_default();
        let mut endpoint = TcpEndpoint::new(host.clone(), self.port.unwrap_or_default());
        endpoint.connect_timeout = self
            .connect_timeout_ms
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis);
        endpoint.write_timeout = self.write_timeout_ms.map(Duration::from_millis);
        endpoint.tls = self.tls.as_ref().map(|tls| TlsOptions {
            domain: tls.domain.clone().unwrap_or(host),
            insecure_skip_verify: tls.insecure,
        });
        endpoint
    }

    fn build_writer_config(&self) -> TcpWriterConfig {
        TcpWriterConfig {
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            reconnect_policy: self.reconnect.policy(),
            failure_handler: self.failure_handler.clone(),
        }
    }
}

impl HandlerBuilderTrait for TcpHandlerBuilder {
    type Handler = TcpLogHandler;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        self.validate()?;
        let formatter = self
            .formatter
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultLineFormatter) as SharedLineFormatter);
        Ok(TcpLogHandler::new(
            self.build_endpoint(),
            self.build_writer_config(),
            formatter,
        )?)
    }
}

impl fmt::Debug for TcpHandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpHandlerBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("queue_capacity", &self.queue_capacity)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn default_strategy_matches_the_writer_defaults() {
        assert_eq!(
            ReconnectStrategy::default(),
            ReconnectStrategy::Exponential {
                unit_ms: 1_000,
                ceiling_ms: 600_000
            }
        );
    }

    #[rstest]
    fn endpoint_carries_timeouts_and_tls() {
        let builder = TcpHandlerBuilder::new()
            .with_address("logs.example", 9000)
            .with_connect_timeout_ms(250)
            .with_write_timeout_ms(500)
            .with_tls(None, true);
        builder.validate().expect("valid");
        let endpoint = builder.build_endpoint();
        assert_eq!(endpoint.connect_timeout, Duration::from_millis(250));
        assert_eq!(endpoint.write_timeout, Some(Duration::from_millis(500)));
        let tls = endpoint.tls.expect("tls");
        assert_eq!(tls.domain, "logs.example");
        assert!(tls.insecure_skip_verify);
    }

    #[rstest]
    fn writer_config_uses_default_capacity() {
        let config = TcpHandlerBuilder::new()
            .with_address("localhost", 9000)
            .build_writer_config();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.failure_handler.is_none());
    }

    #[rstest]
    #[case(TcpHandlerBuilder::new(), "address")]
    #[case(TcpHandlerBuilder::new().with_address(" ", 1), "host")]
    #[case(TcpHandlerBuilder::new().with_address("h", 0), "port")]
    #[case(TcpHandlerBuilder::new().with_address("h", 1).with_queue_capacity(0), "queue_capacity")]
    #[case(TcpHandlerBuilder::new().with_address("h", 1).with_connect_timeout_ms(0), "connect_timeout_ms")]
    #[case(TcpHandlerBuilder::new().with_address("h", 1).with_backoff(0, 10), "backoff_unit_ms")]
    #[case(TcpHandlerBuilder::new().with_address("h", 1).with_backoff(10, 5), "backoff_ceiling_ms")]
    fn rejects_invalid_configuration(#[case] builder: TcpHandlerBuilder, #[case] needle: &str) {
        let Err(err) = builder.build() else {
            panic!("configuration should be rejected");
        };
        assert!(
            matches!(&err, HandlerBuildError::InvalidConfig(msg) if msg.contains(needle)),
            "unexpected error {err}"
        );
    }
}
