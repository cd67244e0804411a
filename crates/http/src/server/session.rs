use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use http::{Method, StatusCode};
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, trace};

use crate::codec::{HeaderEncoder, MessageEncoder, RequestHeadDecoder, outgoing_payload_size};
use crate::connection::Connection;
use crate::ensure;
use crate::protocol::{ErrorKind, HttpError, Request, RequestHead, Response};
use crate::server::ServerInner;

const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Serves one accepted connection until it closes, fails or the server stops.
pub(super) async fn serve(server: Arc<ServerInner>, connection: Connection, remote_addr: SocketAddr) {
    let id = connection.id();
    let mut session = Session { server: &server, connection, remote_addr, head: None, reading: true };

    match session.run().await {
        Ok(()) => debug!(connection = id, "connection finished"),
        Err(HttpError::Cancelled) => {
            trace!(connection = id, "server dropped, abandoning connection");
            return;
        }
        Err(e) => session.fail(e).await,
    }

    session.connection.disconnect().await;
    if let Some(_lock) = server.scope.try_enter() {
        server.unregister(id);
    }
}

#[derive(Debug)]
struct Session<'a> {
    server: &'a ServerInner,
    connection: Connection,
    remote_addr: SocketAddr,
    /// Head of the request being served, for error reports.
    head: Option<RequestHead>,
    /// Whether a failure would still be the peer's fault, so an error status
    /// can be sent back.
    reading: bool,
}

impl Session<'_> {
    async fn run(&mut self) -> Result<(), HttpError> {
        if self.connection.is_secure() {
            self.connection.handshake(self.server.config.timeout_request).await?;
            self.check_scope()?;
        }

        while self.serve_one().await? {
            trace!(connection = self.connection.id(), "keep-alive, waiting for next request");
        }
        Ok(())
    }

    /// Serves a single request; `Ok(false)` ends the connection.
    async fn serve_one(&mut self) -> Result<bool, HttpError> {
        let server = self.server;
        let config = &server.config;
        self.head = None;
        self.reading = true;

        let mut decoder = RequestHeadDecoder::new(config.max_request_buffer_size);
        let frame = self.connection.read_frame_within(&mut decoder, config.timeout_request, "reading request head", &server.scope).await?;
        let Some((head, payload_size)) = frame else {
            trace!(connection = self.connection.id(), "peer closed between requests");
            return Ok(false);
        };
        self.head = Some(head.clone());

        if head.expects_continue() {
            self.connection.write_all(CONTINUE_RESPONSE, config.timeout_content, "writing continue").await?;
            self.check_scope()?;
            debug!(connection = self.connection.id(), "sent continue response");
        }

        let content = self
            .connection
            .read_payload(payload_size, config.max_request_buffer_size, config.timeout_content, &server.scope)
            .await?;
        self.reading = false;

        let request_keep_alive = head.keep_alive();
        let is_head = head.method == Method::HEAD;
        let request = Request::new(head, content).with_remote_endpoint(Some(self.remote_addr));

        let switch = self.connection.shutdown_switch().clone();
        let result = tokio::select! {
            biased;
            () = switch.tripped() => return Err(HttpError::connection_closed("handling request")),
            result = server.handler.call(request) => result,
        };
        self.check_scope()?;

        let mut response = result.unwrap_or_else(|e| {
            error!(connection = self.connection.id(), cause = %e, "handler failed");
            Response::new(StatusCode::INTERNAL_SERVER_ERROR)
        });

        let keep_alive = request_keep_alive && response.head().keep_alive();
        if !keep_alive && !response.header().contains("Connection") {
            response.header_mut().insert("Connection", "close");
        }

        let mut dst = BytesMut::new();
        encode_response(&response, is_head, &mut dst)?;
        self.connection.write_all(&dst, config.timeout_content, "writing response").await?;
        self.check_scope()?;

        debug!(connection = self.connection.id(), status = %response.status_code(), keep_alive, "sent response");
        Ok(keep_alive)
    }

    /// Answers a malformed or oversized request when possible, then reports the failure.
    async fn fail(&mut self, e: HttpError) {
        let server = self.server;
        if server.stopped.is_tripped() {
            trace!(connection = self.connection.id(), cause = %e, "connection aborted by stop");
            return;
        }

        let status = match e.kind() {
            ErrorKind::MessageSize => Some(StatusCode::PAYLOAD_TOO_LARGE),
            ErrorKind::Protocol => Some(StatusCode::BAD_REQUEST),
            _ => None,
        };
        if let Some(status) = status.filter(|_| self.reading && self.connection.is_open()) {
            let response = Response::new(status).with_header("Connection", "close");
            let mut dst = BytesMut::new();
            if encode_response(&response, false, &mut dst).is_ok() {
                if let Err(e) = self.connection.write_all(&dst, server.config.timeout_content, "writing error response").await {
                    trace!(connection = self.connection.id(), cause = %e, "can't send error response");
                }
            }
        }

        let Some(_lock) = server.scope.try_enter() else {
            return;
        };
        match e.kind() {
            ErrorKind::Timeout => info!(connection = self.connection.id(), cause = %e, "connection timed out"),
            _ => error!(connection = self.connection.id(), cause = %e, "connection failed"),
        }
        if let Some(on_error) = &server.on_error {
            on_error(self.head.as_ref(), &e);
        }
    }

    fn check_scope(&self) -> Result<(), HttpError> {
        ensure!(self.server.scope.try_enter().is_some(), HttpError::Cancelled);
        Ok(())
    }
}

/// Serializes `response`; for a HEAD request only the head goes out, framed
/// as the body would have been.
fn encode_response(response: &Response, head_only: bool, dst: &mut BytesMut) -> Result<(), HttpError> {
    if head_only {
        let payload_size = outgoing_payload_size(response.header(), response.body(), true);
        HeaderEncoder.encode((response.head(), payload_size), dst)?;
    } else {
        MessageEncoder::new().encode((response.head(), response.body()), dst)?;
    }
    Ok(())
}
