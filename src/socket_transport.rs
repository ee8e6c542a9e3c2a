//! Connected stream and datagram sockets.
//!
//! [`SocketTransport`] is the only surface the TCP writer and the UDP handler
//! see: write a whole buffer, or close. [`TcpEndpoint::connect`] produces a
//! plain or TLS stream; [`UdpEndpoint::connect`] produces a connected datagram
//! socket.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

/// Default timeout for establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Aborts a connection from another thread, waking a blocked write.
pub type ShutdownHandle = Box<dyn Fn() + Send + Sync>;

/// A connected socket that accepts whole payloads.
pub trait SocketTransport: Send {
    /// Write every byte of `bytes` or fail.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Release the socket. Further sends fail.
    fn close(&mut self);

    /// A handle that tears the connection down while `send` is blocked on a
    /// peer that stopped reading. `None` when the socket cannot block.
    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        None
    }
}

fn stream_shutdown_handle(stream: &TcpStream) -> Option<ShutdownHandle> {
    let stream = stream.try_clone().ok()?;
    Some(Box::new(move || {
        let _ = stream.shutdown(Shutdown::Both);
    }))
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// Where and how to open a TCP stream.
#[derive(Clone, Debug)]
pub struct TcpEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsOptions>,
    pub connect_timeout: Duration,
    pub write_timeout: Option<Duration>,
}

impl TcpEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: None,
        }
    }

    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }

    fn connect_stream(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_write_timeout(self.write_timeout)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}:{}", self.host, self.port),
            )
        }))
    }

    /// Open a new connection, performing the TLS handshake when configured.
    pub fn connect(&self) -> io::Result<TcpConnection> {
        let stream = self.connect_stream()?;
        let Some(tls) = &self.tls else {
            return Ok(TcpConnection::Plain(stream));
        };
        let connector = tls.connector()?;
        stream.set_read_timeout(Some(self.connect_timeout))?;
        let stream = connector
            .connect(&tls.domain, stream)
            .map_err(io::Error::other)?;
        stream.get_ref().set_read_timeout(None)?;
        Ok(TcpConnection::Tls(Box::new(stream)))
    }
}

/// An open TCP stream, optionally wrapped in TLS.
pub enum TcpConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Closed,
}

impl SocketTransport for TcpConnection {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(bytes)?;
                stream.flush()
            }
            Self::Tls(stream) => {
                stream.write_all(bytes)?;
                stream.flush()
            }
            Self::Closed => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            )),
        }
    }

    fn close(&mut self) {
        match std::mem::replace(self, Self::Closed) {
            Self::Plain(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            Self::Tls(mut stream) => {
                let _ = stream.shutdown();
            }
            Self::Closed => {}
        }
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        match self {
            Self::Plain(stream) => stream_shutdown_handle(stream),
            Self::Tls(stream) => stream_shutdown_handle(stream.get_ref()),
            Self::Closed => None,
        }
    }
}

/// Where to send datagrams.
#[derive(Clone, Debug)]
pub struct UdpEndpoint {
    pub host: String,
    pub port: u16,
}

impl UdpEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Bind an ephemeral local socket and connect it to the endpoint.
    pub fn connect(&self) -> io::Result<UdpConnection> {
        let target = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses resolved for {}:{}", self.host, self.port),
                )
            })?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(target)?;
        Ok(UdpConnection {
            socket: Some(socket),
        })
    }
}

/// A connected datagram socket. Each `send` is one datagram.
#[derive(Debug)]
pub struct UdpConnection {
    socket: Option<UdpSocket>,
}

impl SocketTransport for UdpConnection {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is closed"))?;
        let written = socket.send(bytes)?;
        if written != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated to {written} of {} bytes", bytes.len()),
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.socket = None;
    }
}
