//! HTTP/1.1 client
//!
//! A [`Client`] talks to one destination (`host[:port]`) over plain TCP or
//! TLS, optionally through a proxy. Connections are pooled per destination
//! and reused across requests while the server keeps them alive.
//!
//! ```no_run
//! use brook_http::client::Client;
//! use brook_http::protocol::ClientRequest;
//!
//! # async fn run() -> Result<(), brook_http::protocol::HttpError> {
//! let client = Client::new("localhost:8080")?;
//! let response = client.request(ClientRequest::post("/string").body("A string")).await?;
//! println!("{} {}", response.status_code(), response.content_string());
//! # Ok(())
//! # }
//! ```

mod session;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::MessageEncoder;
use crate::config::{ClientConfig, ClientTlsConfig};
use crate::connection::ConnectionPool;
use crate::protocol::{ClientRequest, HttpError, RequestHead, Response};
use crate::scope::ScopeGuard;
use crate::transport::{Destination, PlainFactory, TlsClientFactory, TransportFactory};

/// A client bound to one destination.
///
/// Dropping the client fails every request still in flight; callbacks passed
/// to [`Client::request_with`] are not invoked after the drop returns. A
/// callback must not drop the client it was issued from.
#[derive(Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    destination: Destination,
    default_port: u16,
    secure: bool,
    proxy: Option<Destination>,
    config: ClientConfig,
    pool: ConnectionPool,
    scope: ScopeGuard,
}

#[derive(Debug)]
enum TlsSetup {
    Files(ClientTlsConfig),
    Rustls(Arc<rustls::ClientConfig>),
}

#[derive(Debug)]
pub struct ClientBuilder {
    host_port: String,
    config: ClientConfig,
    tls: Option<TlsSetup>,
}

impl ClientBuilder {
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Talks TLS, loading trust anchors and client credentials from PEM files.
    #[must_use]
    pub fn tls(mut self, tls: ClientTlsConfig) -> Self {
        self.tls = Some(TlsSetup::Files(tls));
        self
    }

    /// Talks TLS with a prepared rustls configuration.
    #[must_use]
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(TlsSetup::Rustls(config));
        self
    }

    pub fn build(self) -> Result<Client, HttpError> {
        let factory: Arc<dyn TransportFactory> = match self.tls {
            None => Arc::new(PlainFactory),
            Some(TlsSetup::Files(tls)) => Arc::new(TlsClientFactory::from_config(&tls)?),
            Some(TlsSetup::Rustls(config)) => Arc::new(TlsClientFactory::new(config)),
        };

        let default_port = factory.default_port();
        let destination = Destination::parse(&self.host_port, default_port)?;
        let proxy = self.config.proxy_server.as_deref().map(|proxy| Destination::parse(proxy, 80)).transpose()?;

        let inner = ClientInner {
            destination,
            default_port,
            secure: factory.is_secure(),
            proxy,
            pool: ConnectionPool::new(Arc::clone(&factory), self.config.idle_timeout),
            config: self.config,
            scope: ScopeGuard::new(),
        };
        Ok(Client { inner: Arc::new(inner) })
    }
}

impl Client {
    /// A plain HTTP client with default settings.
    pub fn new(host_port: &str) -> Result<Self, HttpError> {
        Self::builder(host_port).build()
    }

    pub fn builder<S: Into<String>>(host_port: S) -> ClientBuilder {
        ClientBuilder { host_port: host_port.into(), config: ClientConfig::default(), tls: None }
    }

    pub fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Sends `request` and waits for the whole response.
    pub async fn request(&self, request: ClientRequest) -> Result<Response, HttpError> {
        session::exchange(&self.inner, request).await
    }

    /// Sends `request` in the background and hands the outcome to `callback`.
    ///
    /// The callback runs exactly once, unless the client is dropped before
    /// the exchange completes, in which case it never runs.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn request_with<F>(&self, request: ClientRequest, callback: F)
    where
        F: FnOnce(Result<Response, HttpError>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = session::exchange(&inner, request).await;
            if matches!(result, Err(HttpError::Cancelled)) {
                trace!(destination = %inner.destination, "client dropped, discarding result");
                return;
            }
            let Some(_lock) = inner.scope.try_enter() else {
                return;
            };
            callback(result);
        });
    }

    /// Aborts every exchange in flight; their callbacks still run with an error.
    pub fn stop(&self) {
        self.inner.pool.shutdown_all();
    }

    /// Connections currently registered in the pool, in use or idle.
    pub fn pool_size(&self) -> usize {
        self.inner.pool.len()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.scope.stop();
        self.inner.pool.shutdown_all();
    }
}

impl ClientInner {
    /// Serializes `request` for the wire, adding `Host` and picking the
    /// request target form.
    fn serialize(&self, request: ClientRequest) -> Result<Bytes, HttpError> {
        let (method, path, mut header, body) = request.into_parts();
        let path = if path.is_empty() { String::from("/") } else { path };
        let target = if self.proxy.is_some() && !self.secure {
            format!("http://{}{path}", self.destination.authority())
        } else {
            path
        };

        if !header.contains("Host") {
            header.insert("Host", self.destination.host_header(self.default_port));
        }

        let mut head = RequestHead::new(method, &target);
        head.header = header;

        let mut dst = BytesMut::new();
        MessageEncoder::new().encode((&head, &body), &mut dst)?;
        Ok(dst.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[test]
    fn host_header_and_content_length() {
        let client = Client::new("example.com").unwrap();
        let bytes = client.inner.serialize(ClientRequest::post("/string").body("A string")).unwrap();
        assert_eq!(&bytes[..], b"POST /string HTTP/1.1\r\nHost: example.com\r\nContent-Length: 8\r\n\r\nA string");

        let client = Client::new("example.com:8080").unwrap();
        let bytes = client.inner.serialize(ClientRequest::get("")).unwrap();
        assert_eq!(&bytes[..], b"GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n");
    }

    #[test]
    fn absolute_form_through_proxy() {
        let config = ClientConfig { proxy_server: Some("proxy.local:3128".into()), ..Default::default() };
        let client = Client::builder("example.com").config(config).build().unwrap();
        let bytes = client.inner.serialize(ClientRequest::get("/a?b=c")).unwrap();
        assert!(bytes.starts_with(b"GET http://example.com:80/a?b=c HTTP/1.1\r\n"));
    }

    #[test]
    fn invalid_destination() {
        let err = Client::new("example.com:http").unwrap_err();
        assert_eq!(err.kind(), crate::protocol::ErrorKind::Config);
    }
}
