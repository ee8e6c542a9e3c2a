//! Terminal HTTP transport for collector batches.
//!
//! [`UreqTransport`] POSTs a serialised batch to
//! `<base-uri>/services/collector/event/1.0` with a static
//! `Authorization: <scheme> <token>` header. Status codes are returned to the
//! caller unchanged; only failures that prevent a response (DNS, connect,
//! reset, timeout) become [`TransportError`]s. Retry decisions belong to the
//! middleware chain.

use std::{io, time::Duration};

use thiserror::Error;
use ureq::{Agent, AgentBuilder};

/// Path of the collector event endpoint relative to the base URI.
pub const COLLECTOR_EVENT_PATH: &str = "/services/collector/event/1.0";
/// Authorization scheme placed before the token.
pub const DEFAULT_AUTH_SCHEME: &str = "Splunk";
/// Default connection timeout for collector requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default overall request timeout for collector requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status and reply body returned by the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostResponse {
    pub status: u16,
    pub body: String,
}

impl PostResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The collector acknowledges a batch with exactly `200 OK`.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Failures that prevented a response from being received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS, or timeout failure reported by the HTTP client.
    #[error("network error: {0}")]
    Network(String),
    /// I/O failure while reading the reply.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The background send could not be started.
    #[error("failed to start background send: {0}")]
    Spawn(io::Error),
}

/// Performs the network POST of one serialised batch.
pub trait BatchTransport: Send + Sync {
    /// POST `payload` authenticated with `token`.
    fn post_batch(&self, token: &str, payload: &str) -> Result<PostResponse, TransportError>;
}

/// Settings for [`UreqTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Base URI of the collector, for example `https://collector:8088`.
    pub endpoint: String,
    pub auth_scheme: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_scheme: DEFAULT_AUTH_SCHEME.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Full URL of the event endpoint.
    pub fn event_url(&self) -> String {
        format!(
            "{}{}",
            self.endpoint.trim_end_matches('/'),
            COLLECTOR_EVENT_PATH
        )
    }
}

/// Blocking HTTP transport backed by a pooled `ureq::Agent`.
pub struct UreqTransport {
    agent: Agent,
    url: String,
    auth_scheme: String,
}

impl UreqTransport {
    pub fn new(config: &HttpTransportConfig) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .build();
        Self {
            agent,
            url: config.event_url(),
            auth_scheme: config.auth_scheme.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BatchTransport for UreqTransport {
    fn post_batch(&self, token: &str, payload: &str) -> Result<PostResponse, TransportError> {
        let result = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("{} {}", self.auth_scheme, token))
            .set("Content-Type", "application/json")
            .send_string(payload);

        match result {
            Ok(response) => {
                let status = response.status();
                let body = response.into_string()?;
                Ok(PostResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(PostResponse {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(err)) => Err(TransportError::Network(err.to_string())),
        }
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("url", &self.url)
            .field("auth_scheme", &self.auth_scheme)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("http://collector:8088", "http://collector:8088/services/collector/event/1.0")]
    #[case("http://collector:8088/", "http://collector:8088/services/collector/event/1.0")]
    fn event_url_joins_base_and_path(#[case] base: &str, #[case] expected: &str) {
        assert_eq!(HttpTransportConfig::new(base).event_url(), expected);
    }

    #[rstest]
    #[case(200, true)]
    #[case(201, false)]
    #[case(400, false)]
    fn only_200_is_success(#[case] status: u16, #[case] success: bool) {
        assert_eq!(PostResponse::new(status, "").is_success(), success);
    }

    #[rstest]
    fn unreachable_endpoint_is_a_network_error() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let mut config = HttpTransportConfig::new(format!("http://{addr}"));
        config.connect_timeout = Duration::from_millis(200);
        let transport = UreqTransport::new(&config);
        let err = transport
            .post_batch("token", "{}")
            .expect_err("closed port must fail");
        assert!(matches!(err, TransportError::Network(_)));
    }
}
