//! Byte-stream transports a connection runs over.
//!
//! A [`Transport`] is an async byte stream with an explicit lifecycle:
//! connect, an optional handshake, then reads and writes until it is closed.
//! [`PlainTransport`] is bare TCP; [`TlsTransport`] adds a TLS handshake and
//! can carry plain bytes before it (a proxy `CONNECT` tunnel). Sessions only
//! see `Box<dyn Transport>`, so the choice is made once, when a connection is
//! created by a [`TransportFactory`].

use std::fmt;
use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::HttpError;

mod plain;
mod tls;

pub use plain::{PlainFactory, PlainTransport};
pub use tls::{TlsClientFactory, TlsTransport, load_certificates, load_private_key, tls_client_config, tls_server_config};

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Reads and writes go through the `AsyncRead` / `AsyncWrite` supertraits;
/// the methods here cover the lifecycle around them.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {
    fn is_open(&self) -> bool;

    fn is_secure(&self) -> bool;

    /// Resolves `address` (`host:port`) and connects to the first endpoint
    /// that accepts.
    async fn connect(&mut self, address: &str) -> io::Result<()>;

    /// Runs the security handshake, if the transport has one.
    async fn handshake(&mut self) -> io::Result<()>;

    /// Sends a graceful shutdown to the peer and closes.
    async fn disconnect(&mut self) -> io::Result<()>;

    /// Closes immediately, without telling the peer.
    fn close(&mut self);

    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Creates unconnected client transports for one scheme.
pub trait TransportFactory: Send + Sync + fmt::Debug {
    fn create(&self, destination: &Destination) -> Result<Box<dyn Transport>, HttpError>;

    fn is_secure(&self) -> bool;

    fn default_port(&self) -> u16;
}

/// Where a client sends its requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parses `host[:port]`, including bracketed IPv6 literals such as
    /// `[::1]:8080`.
    ///
    /// ```
    /// # use brook_http::transport::Destination;
    /// let destination = Destination::parse("localhost:8080", 80).unwrap();
    /// assert_eq!(destination.port(), 8080);
    /// assert_eq!(Destination::parse("[::1]", 443).unwrap().authority(), "[::1]:443");
    /// ```
    pub fn parse(host_port: &str, default_port: u16) -> Result<Self, HttpError> {
        let host_port = host_port.trim();
        let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
            let (host, after) =
                rest.split_once(']').ok_or_else(|| HttpError::config(format!("unterminated IPv6 literal in {host_port}")))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(HttpError::config(format!("unexpected characters after IPv6 literal in {host_port}"))),
            }
        } else {
            match host_port.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                // bare IPv6 literal without a port
                Some(_) => (host_port, None),
                None => (host_port, None),
            }
        };

        if host.is_empty() {
            return Err(HttpError::config(format!("missing host in {host_port:?}")));
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|e| HttpError::config(format!("invalid port {port:?}: {e}")))?,
            None => default_port,
        };
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 hosts in brackets.
    pub fn authority(&self) -> String {
        if self.host.contains(':') { format!("[{}]:{}", self.host, self.port) } else { format!("{}:{}", self.host, self.port) }
    }

    /// The value for a `Host` header; the port is left out when it is the
    /// scheme default.
    pub fn host_header(&self, default_port: u16) -> String {
        if self.port == default_port {
            if self.host.contains(':') { format!("[{}]", self.host) } else { self.host.clone() }
        } else {
            self.authority()
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    #[test]
    fn parse_host_and_port() {
        let destination = Destination::parse("localhost:8080", DEFAULT_HTTP_PORT).unwrap();
        assert_eq!(destination.host(), "localhost");
        assert_eq!(destination.port(), 8080);
        assert_eq!(destination.to_string(), "localhost:8080");
        assert_eq!(destination.host_header(DEFAULT_HTTP_PORT), "localhost:8080");
    }

    #[test]
    fn default_ports() {
        assert_eq!(Destination::parse("example.com", DEFAULT_HTTP_PORT).unwrap().port(), 80);
        assert_eq!(Destination::parse("example.com", DEFAULT_HTTPS_PORT).unwrap().port(), 443);
        assert_eq!(Destination::parse("example.com", DEFAULT_HTTPS_PORT).unwrap().host_header(DEFAULT_HTTPS_PORT), "example.com");
    }

    #[test]
    fn ipv6_literals() {
        let destination = Destination::parse("[::1]:8443", DEFAULT_HTTPS_PORT).unwrap();
        assert_eq!(destination.host(), "::1");
        assert_eq!(destination.port(), 8443);
        assert_eq!(destination.authority(), "[::1]:8443");

        let destination = Destination::parse("::1", DEFAULT_HTTP_PORT).unwrap();
        assert_eq!(destination.host(), "::1");
        assert_eq!(destination.port(), 80);
    }

    #[test]
    fn invalid_input() {
        assert_eq!(Destination::parse("", 80).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(Destination::parse("host:http", 80).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(Destination::parse("[::1", 80).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(Destination::parse(":8080", 80).unwrap_err().kind(), ErrorKind::Config);
    }
}
