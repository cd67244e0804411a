//! Client, server and TLS settings.
//!
//! All settings are plain public fields with defaults, so a caller can write
//! `ServerConfig { port: 8080, ..Default::default() }`. A zero [`Duration`]
//! disables the corresponding timeout.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on each request step after the connection is established.
    pub timeout: Duration,
    /// Bound on resolving, connecting, proxy tunnelling and the TLS handshake.
    pub timeout_connect: Duration,
    /// A response larger than this fails with a message size error.
    pub max_response_buffer_size: usize,
    /// `host:port` of an HTTP proxy. Plain requests are sent in absolute form
    /// through it; TLS requests open a `CONNECT` tunnel.
    pub proxy_server: Option<String>,
    /// Whether a request whose method is not idempotent may be replayed once
    /// when a reused keep-alive connection turns out to be stale.
    pub reconnect_non_idempotent: bool,
    /// Idle pooled connections older than this are closed instead of reused.
    pub idle_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            timeout_connect: Duration::ZERO,
            max_response_buffer_size: usize::MAX,
            proxy_server: None,
            reconnect_non_idempotent: true,
            idle_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind; all IPv4 interfaces by default.
    pub address: IpAddr,
    /// Port to bind; 0 asks the OS for an ephemeral port.
    pub port: u16,
    /// Worker threads used by [`Server::run`](crate::server::Server::run).
    pub thread_pool_size: usize,
    /// Bound on receiving a request head, including the TLS handshake.
    pub timeout_request: Duration,
    /// Bound on receiving a request body and on writing the response.
    pub timeout_content: Duration,
    /// A request larger than this is answered with `413 Payload Too Large`.
    pub max_request_buffer_size: usize,
    /// Sets `SO_REUSEADDR` on the listening socket.
    pub reuse_address: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            thread_pool_size: 1,
            timeout_request: Duration::from_secs(5),
            timeout_content: Duration::from_secs(300),
            max_request_buffer_size: usize::MAX,
            reuse_address: true,
        }
    }
}

/// TLS settings for a client, loaded from PEM files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTlsConfig {
    /// When false, any server certificate is accepted.
    pub verify_certificate: bool,
    /// Extra trust anchors; the Mozilla root set is always included.
    pub verify_file: Option<PathBuf>,
    /// Client certificate chain and key, for servers that ask for one.
    pub certification_file: Option<PathBuf>,
    pub private_key_file: Option<PathBuf>,
}

impl Default for ClientTlsConfig {
    fn default() -> Self {
        Self { verify_certificate: true, verify_file: None, certification_file: None, private_key_file: None }
    }
}

/// TLS settings for a server, loaded from PEM files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTlsConfig {
    pub certification_file: PathBuf,
    pub private_key_file: PathBuf,
    /// When set, clients must present a certificate signed by one of these roots.
    pub verify_file: Option<PathBuf>,
}

impl ServerTlsConfig {
    pub fn new<C: Into<PathBuf>, K: Into<PathBuf>>(certification_file: C, private_key_file: K) -> Self {
        Self { certification_file: certification_file.into(), private_key_file: private_key_file.into(), verify_file: None }
    }
}
