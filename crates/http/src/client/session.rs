use http::{Method, StatusCode};
use tracing::{trace, warn};

use crate::client::ClientInner;
use crate::codec::ResponseHeadDecoder;
use crate::connection::Connection;
use crate::ensure;
use crate::protocol::{Body, ClientRequest, ErrorKind, HttpError, Response};

/// Where a client exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connecting,
    ProxyTunneling,
    TlsHandshaking,
    Writing,
    ReadingPreamble,
    ReadingBody,
    Done,
}

/// One request/response exchange, owning its pooled connection until the end.
#[derive(Debug)]
struct Session<'a> {
    client: &'a ClientInner,
    connection: Connection,
    stage: Stage,
    reconnected: bool,
    reusable: bool,
}

/// Runs a whole exchange: acquire, transfer, optional single reconnect, release.
pub(super) async fn exchange(client: &ClientInner, request: ClientRequest) -> Result<Response, HttpError> {
    let method = request.method().clone();
    let message = client.serialize(request)?;

    let connection = {
        ensure!(client.scope.try_enter().is_some(), HttpError::Cancelled);
        client.pool.acquire(&client.destination)?
    };
    let mut session = Session { client, connection, stage: Stage::Connecting, reconnected: false, reusable: false };

    let result = loop {
        match session.transfer(&method, &message).await {
            Err(e) if session.may_reconnect(&method, &e) => {
                warn!(connection = session.connection.id(), cause = %e, "reused connection went stale, reconnecting");
                session.reconnected = true;
                session.connection.close();
            }
            result => break result,
        }
    };

    if let Err(e) = &result {
        trace!(connection = session.connection.id(), stage = ?session.stage, cause = %e, "exchange failed");
    }
    session.finish(result.is_ok());
    result
}

impl Session<'_> {
    async fn transfer(&mut self, method: &Method, message: &[u8]) -> Result<Response, HttpError> {
        let client = self.client;
        let config = &client.config;
        self.reusable = false;

        if !self.connection.is_open() {
            self.enter(Stage::Connecting);
            let address = client.proxy.as_ref().unwrap_or(&client.destination).authority();
            self.connection.connect(&address, config.timeout_connect).await?;
            self.check_scope()?;

            if self.connection.is_secure() {
                if client.proxy.is_some() {
                    self.enter(Stage::ProxyTunneling);
                    self.tunnel().await?;
                }
                self.enter(Stage::TlsHandshaking);
                self.connection.handshake(config.timeout_connect).await?;
                self.check_scope()?;
            }
        }

        self.enter(Stage::Writing);
        self.connection.write_all(message, config.timeout, "writing request").await?;
        self.check_scope()?;

        self.enter(Stage::ReadingPreamble);
        let limit = config.max_response_buffer_size;
        let mut decoder = ResponseHeadDecoder::new(method.clone(), limit);
        let (head, payload_size) = loop {
            let frame = self.connection.read_frame(&mut decoder, config.timeout, "reading response head", &client.scope).await?;
            let Some((head, payload_size)) = frame else {
                return Err(HttpError::connection_closed("reading response head"));
            };
            if head.status_code.is_informational() && head.status_code != StatusCode::SWITCHING_PROTOCOLS {
                trace!(connection = self.connection.id(), status = %head.status_code, "skipping interim response");
                continue;
            }
            break (head, payload_size);
        };

        self.enter(Stage::ReadingBody);
        let content = self.connection.read_payload(payload_size, limit, config.timeout, &client.scope).await?;

        self.reusable = !payload_size.is_unframed() && head.keep_alive();
        self.enter(Stage::Done);
        Ok(Response::from_parts(head, Body::from(content)))
    }

    /// Opens a `CONNECT` tunnel through the proxy to the destination.
    async fn tunnel(&mut self) -> Result<(), HttpError> {
        let timeout = self.client.config.timeout_connect;
        let authority = self.client.destination.authority();
        let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
        self.connection.write_all(request.as_bytes(), timeout, "proxy tunnelling").await?;
        self.check_scope()?;

        let mut decoder = ResponseHeadDecoder::new(Method::CONNECT, self.client.config.max_response_buffer_size);
        let frame = self.connection.read_frame(&mut decoder, timeout, "proxy tunnelling", &self.client.scope).await?;
        let Some((head, _)) = frame else {
            return Err(HttpError::connection_closed("proxy tunnelling"));
        };
        ensure!(
            head.status_code.is_success(),
            HttpError::permission(format!("proxy refused tunnel to {authority}: {}", head.status_code))
        );
        Ok(())
    }

    /// A reused connection that fails before any response byte arrives was
    /// most likely closed by the peer while idle; it gets one fresh attempt.
    fn may_reconnect(&self, method: &Method, e: &HttpError) -> bool {
        !self.reconnected
            && self.connection.is_reused()
            && e.kind() == ErrorKind::Transport
            && matches!(self.stage, Stage::Writing | Stage::ReadingPreamble)
            && self.connection.buffer().is_empty()
            && !self.connection.shutdown_switch().is_tripped()
            && (method.is_idempotent() || self.client.config.reconnect_non_idempotent)
    }

    fn check_scope(&self) -> Result<(), HttpError> {
        ensure!(self.client.scope.try_enter().is_some(), HttpError::Cancelled);
        Ok(())
    }

    fn enter(&mut self, stage: Stage) {
        trace!(connection = self.connection.id(), ?stage, "client session");
        self.stage = stage;
    }

    fn finish(self, succeeded: bool) {
        let Some(_lock) = self.client.scope.try_enter() else {
            return;
        };
        self.client.pool.release(&self.client.destination, self.connection, succeeded && self.reusable);
    }
}
