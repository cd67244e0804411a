//! HTTP/1.1 server
//!
//! A [`Server`] accepts plain or TLS connections and runs a session per
//! connection: read a request, hand it to the [`Handler`], write the
//! response, and repeat while both sides keep the connection alive.
//!
//! ```no_run
//! use brook_http::config::ServerConfig;
//! use brook_http::handler::{make_handler, BoxError};
//! use brook_http::protocol::{Request, Response};
//! use brook_http::server::Server;
//!
//! async fn echo(request: Request) -> Result<Response, BoxError> {
//!     Ok(Response::ok(request.content().clone()))
//! }
//!
//! # async fn run() -> Result<(), brook_http::protocol::HttpError> {
//! let server = Server::builder()
//!     .config(ServerConfig { port: 8080, ..Default::default() })
//!     .handler(make_handler(echo))
//!     .build()?;
//! server.start().await
//! # }
//! ```

mod session;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, ServerTlsConfig};
use crate::connection::Connection;
use crate::handler::Handler;
use crate::protocol::{HttpError, RequestHead};
use crate::scope::ScopeGuard;
use crate::timeout::ShutdownSwitch;
use crate::transport::{PlainTransport, TlsTransport, Transport, tls_server_config};

/// Called for every failure that ends a connection, with the request head
/// when one was read.
pub type ErrorObserver = Arc<dyn Fn(Option<&RequestHead>, &HttpError) + Send + Sync>;

const LISTEN_BACKLOG: u32 = 1024;

#[derive(Debug)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// Stops a running server from elsewhere.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    inner: Arc<ServerInner>,
}

pub(crate) struct ServerInner {
    config: ServerConfig,
    handler: Arc<dyn Handler>,
    tls: Option<Arc<rustls::ServerConfig>>,
    on_error: Option<ErrorObserver>,
    scope: ScopeGuard,
    stopped: ShutdownSwitch,
    connections: Mutex<HashMap<u64, ShutdownSwitch>>,
    next_id: AtomicU64,
    listener: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
}

impl fmt::Debug for ServerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInner")
            .field("config", &self.config)
            .field("tls", &self.tls.is_some())
            .field("local_addr", &self.local_addr.get())
            .field("stopped", &self.stopped.is_tripped())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    handler: Option<Arc<dyn Handler>>,
    tls: Option<Arc<rustls::ServerConfig>>,
    tls_files: Option<ServerTlsConfig>,
    on_error: Option<ErrorObserver>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("has_handler", &self.handler.is_some())
            .field("tls_files", &self.tls_files)
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Serves TLS with a certificate chain and key loaded from PEM files.
    #[must_use]
    pub fn tls(mut self, tls: ServerTlsConfig) -> Self {
        self.tls_files = Some(tls);
        self
    }

    /// Serves TLS with a prepared rustls configuration.
    #[must_use]
    pub fn tls_config(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(Option<&RequestHead>, &HttpError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Result<Server, HttpError> {
        let Some(handler) = self.handler else {
            return Err(HttpError::config("server has no handler"));
        };
        let tls = match (self.tls, self.tls_files) {
            (Some(config), _) => Some(config),
            (None, Some(files)) => Some(tls_server_config(&files)?),
            (None, None) => None,
        };

        let inner = ServerInner {
            config: self.config,
            handler,
            tls,
            on_error: self.on_error,
            scope: ScopeGuard::new(),
            stopped: ShutdownSwitch::new(),
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            listener: Mutex::new(None),
            local_addr: OnceLock::new(),
        };
        Ok(Server { inner: Arc::new(inner) })
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Binds the listening socket, if not yet bound, and returns its address.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn bind(&self) -> Result<SocketAddr, HttpError> {
        if let Some(local_addr) = self.inner.local_addr.get() {
            return Ok(*local_addr);
        }

        let config = &self.inner.config;
        let address = SocketAddr::new(config.address, config.port);
        let socket = if address.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(config.reuse_address)?;
        socket.bind(address)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let local_addr = listener.local_addr()?;

        *lock(&self.inner.listener) = Some(listener);
        Ok(*self.inner.local_addr.get_or_init(|| local_addr))
    }

    /// Accepts connections until [`Server::stop`] is called.
    pub async fn start(&self) -> Result<(), HttpError> {
        let local_addr = self.bind()?;
        let Some(listener) = lock(&self.inner.listener).take() else {
            return Err(HttpError::config("server already started"));
        };
        info!(%local_addr, tls = self.inner.tls.is_some(), "server listening");

        loop {
            let accepted = tokio::select! {
                () = self.inner.stopped.tripped() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, remote_addr) = match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let Some(_lock) = self.inner.scope.try_enter() else {
                break;
            };
            self.inner.spawn_session(stream, remote_addr);
        }

        info!(%local_addr, "server stopped accepting");
        Ok(())
    }

    /// Runs the server on a dedicated multi-thread runtime with
    /// `thread_pool_size` workers, blocking until it stops.
    pub fn run(self) -> Result<(), HttpError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.inner.config.thread_pool_size.max(1))
            .enable_all()
            .build()?;
        runtime.block_on(self.start())
    }

    /// Stops accepting and aborts every live connection.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle { inner: Arc::clone(&self.inner) }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// Connections currently being served.
    pub fn connection_count(&self) -> usize {
        lock(&self.inner.connections).len()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.inner.scope.stop();
        self.inner.stop();
    }
}

impl ServerHandle {
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }
}

impl ServerInner {
    fn spawn_session(self: &Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(cause = %e, "can't set nodelay");
        }
        let transport: Box<dyn Transport> = match &self.tls {
            Some(config) => Box::new(TlsTransport::server(Arc::clone(config), stream)),
            None => Box::new(PlainTransport::from_stream(stream)),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let connection = Connection::new(id, transport);
        lock(&self.connections).insert(id, connection.shutdown_switch().clone());
        debug!(connection = id, %remote_addr, "accepted connection");

        tokio::spawn(session::serve(Arc::clone(self), connection, remote_addr));
    }

    fn unregister(&self, id: u64) {
        lock(&self.connections).remove(&id);
    }

    fn stop(&self) {
        self.stopped.trip();
        for (_, switch) in lock(&self.connections).drain() {
            switch.trip();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
