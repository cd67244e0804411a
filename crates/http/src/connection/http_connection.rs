use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::PayloadDecoder;
use crate::ensure;
use crate::protocol::{HttpError, PayloadItem, PayloadSize};
use crate::scope::ScopeGuard;
use crate::timeout::{ShutdownSwitch, TimeoutGuard};
use crate::transport::Transport;

/// Initial read buffer capacity
const INIT_BUFFER_SIZE: usize = 8 * 1024;

/// A transport plus the read buffer and shutdown line that belong to it.
///
/// Every I/O method arms a [`TimeoutGuard`] for its own duration and races
/// the connection's [`ShutdownSwitch`]; a tripped switch fails the operation
/// and closes the transport. A step whose timer fired counts as timed out
/// even when the I/O itself completed, since the switch stays tripped. Bytes read past the end of one message stay in
/// the buffer for the next exchange on the same connection.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    transport: Box<dyn Transport>,
    buffer: BytesMut,
    switch: ShutdownSwitch,
    reused: bool,
}

impl Connection {
    pub fn new(id: u64, transport: Box<dyn Transport>) -> Self {
        Self { id, transport, buffer: BytesMut::with_capacity(INIT_BUFFER_SIZE), switch: ShutdownSwitch::new(), reused: false }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open() && !self.switch.is_tripped()
    }

    pub fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// Whether this connection already carried an exchange before the current one.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn set_reused(&mut self, reused: bool) {
        self.reused = reused;
    }

    pub fn shutdown_switch(&self) -> &ShutdownSwitch {
        &self.switch
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.peer_addr()
    }

    pub fn buffer(&self) -> &BytesMut {
        &self.buffer
    }

    pub async fn connect(&mut self, address: &str, timeout: Duration) -> Result<(), HttpError> {
        self.buffer.clear();
        self.reused = false;

        let switch = self.switch.clone();
        let guard = TimeoutGuard::arm(&switch, timeout, "connecting");
        let result = guarded(&switch, self.transport.connect(address)).await;
        self.settle(guard, result)
    }

    /// Runs the transport handshake; a rejected certificate is a permission error.
    pub async fn handshake(&mut self, timeout: Duration) -> Result<(), HttpError> {
        let switch = self.switch.clone();
        let mut guard = TimeoutGuard::arm(&switch, timeout, "handshaking");
        let result = guarded(&switch, self.transport.handshake()).await;
        guard.cancel();
        match result {
            Err(e) if !guard.fired() && rejected_certificate(&e) => {
                self.transport.close();
                Err(HttpError::permission(e))
            }
            result => self.settle(guard, result),
        }
    }

    /// Reads whatever is available into the buffer; 0 means end of stream.
    pub async fn read_some(&mut self, timeout: Duration, stage: &'static str) -> Result<usize, HttpError> {
        self.buffer.reserve(INIT_BUFFER_SIZE);

        let switch = self.switch.clone();
        let guard = TimeoutGuard::arm(&switch, timeout, stage);
        let result = guarded(&switch, self.transport.read_buf(&mut self.buffer)).await;
        self.settle(guard, result)
    }

    /// Like [`read_some`](Self::read_some), under a guard armed by the caller.
    async fn read_under(&mut self, guard: &TimeoutGuard) -> Result<usize, HttpError> {
        self.buffer.reserve(INIT_BUFFER_SIZE);

        let switch = self.switch.clone();
        let result = guarded(&switch, self.transport.read_buf(&mut self.buffer)).await;
        result.map_err(|e| self.fail(guard, e))
    }

    pub async fn write_all(&mut self, buf: &[u8], timeout: Duration, stage: &'static str) -> Result<(), HttpError> {
        let switch = self.switch.clone();
        let guard = TimeoutGuard::arm(&switch, timeout, stage);
        let transport = &mut self.transport;
        let result = guarded(&switch, async move {
            transport.write_all(buf).await?;
            transport.flush().await
        })
        .await;
        self.settle(guard, result)
    }

    /// Decodes one item, reading more bytes as needed; `timeout` bounds each read.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly before any part of the
    /// item arrived. After every read the owner's scope is checked; a stopped
    /// owner turns into [`HttpError::Cancelled`].
    pub async fn read_frame<D>(
        &mut self,
        decoder: &mut D,
        timeout: Duration,
        stage: &'static str,
        scope: &ScopeGuard,
    ) -> Result<Option<D::Item>, HttpError>
    where
        D: Decoder,
        HttpError: From<D::Error>,
    {
        self.decode_frame(decoder, timeout, None, stage, scope).await
    }

    /// Decodes one item like [`read_frame`](Self::read_frame), but `timeout`
    /// bounds all the reads together, so a peer trickling bytes cannot hold
    /// the connection past it.
    pub async fn read_frame_within<D>(
        &mut self,
        decoder: &mut D,
        timeout: Duration,
        stage: &'static str,
        scope: &ScopeGuard,
    ) -> Result<Option<D::Item>, HttpError>
    where
        D: Decoder,
        HttpError: From<D::Error>,
    {
        let mut guard = TimeoutGuard::arm(&self.switch, timeout, stage);
        let frame = self.decode_frame(decoder, timeout, Some(&guard), stage, scope).await;
        guard.cancel();
        match frame {
            Ok(_) if guard.fired() => Err(self.expire(&guard)),
            frame => frame,
        }
    }

    /// Reads until `decoder` yields; each read is guarded by `whole` when
    /// given, otherwise by a fresh `timeout`.
    async fn decode_frame<D>(
        &mut self,
        decoder: &mut D,
        timeout: Duration,
        whole: Option<&TimeoutGuard>,
        stage: &'static str,
        scope: &ScopeGuard,
    ) -> Result<Option<D::Item>, HttpError>
    where
        D: Decoder,
        HttpError: From<D::Error>,
    {
        loop {
            if let Some(item) = decoder.decode(&mut self.buffer)? {
                return Ok(Some(item));
            }

            let read = match whole {
                Some(guard) => self.read_under(guard).await,
                None => self.read_some(timeout, stage).await,
            };
            ensure!(scope.try_enter().is_some(), HttpError::Cancelled);
            if read? == 0 {
                trace!(connection = self.id, stage, "peer closed the stream");
                return Ok(decoder.decode_eof(&mut self.buffer)?);
            }
        }
    }

    /// Reads a whole body framed as `payload_size`, failing once it grows past `limit`.
    pub async fn read_payload(
        &mut self,
        payload_size: PayloadSize,
        limit: usize,
        timeout: Duration,
        scope: &ScopeGuard,
    ) -> Result<Bytes, HttpError> {
        if let PayloadSize::Length(length) = payload_size {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            ensure!(length <= limit, HttpError::message_size(length, limit));
        }

        let mut decoder = PayloadDecoder::from(payload_size);
        let mut content = BytesMut::new();
        loop {
            match self.read_frame(&mut decoder, timeout, "reading body", scope).await? {
                Some(PayloadItem::Chunk(bytes)) => {
                    let size = content.len() + bytes.len();
                    ensure!(size <= limit, HttpError::message_size(size, limit));
                    content.extend_from_slice(&bytes);
                }
                Some(PayloadItem::Eof) => return Ok(content.freeze()),
                None => return Err(HttpError::connection_closed("reading body")),
            }
        }
    }

    /// Shuts the connection down gracefully; failures only mean the peer is gone.
    pub async fn disconnect(&mut self) {
        let switch = self.switch.clone();
        if let Err(e) = guarded(&switch, self.transport.disconnect()).await {
            trace!(connection = self.id, cause = %e, "disconnect failed");
        }
        self.transport.close();
    }

    pub fn close(&mut self) {
        self.transport.close();
        self.buffer.clear();
    }

    /// Cancels `guard` and turns the outcome of its step into a result.
    fn settle<T>(&mut self, mut guard: TimeoutGuard, result: io::Result<T>) -> Result<T, HttpError> {
        guard.cancel();
        match result {
            Ok(_) if guard.fired() => Err(self.expire(&guard)),
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(&guard, e)),
        }
    }

    /// The step completed just as its timer fired; the switch stays tripped,
    /// so the connection is spent.
    fn expire(&mut self, guard: &TimeoutGuard) -> HttpError {
        trace!(connection = self.id, "step finished as its timeout fired");
        self.fail(guard, io::Error::from(io::ErrorKind::TimedOut))
    }

    fn fail(&mut self, guard: &TimeoutGuard, e: io::Error) -> HttpError {
        self.transport.close();
        guard.classify(e)
    }
}

fn rejected_certificate(e: &io::Error) -> bool {
    matches!(
        e.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()),
        Some(rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented)
    )
}

async fn guarded<T, F>(switch: &ShutdownSwitch, io: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        biased;
        () = switch.tripped() => Err(io::Error::new(io::ErrorKind::ConnectionAborted, "connection shut down")),
        result = io => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RequestHeadDecoder;
    use crate::protocol::ErrorKind;
    use crate::transport::PlainTransport;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let mut connection = Connection::new(1, Box::new(PlainTransport::new()));
        let address = address.to_string();
        let (connected, accepted) = tokio::join!(connection.connect(&address, Duration::ZERO), listener.accept());
        connected.unwrap();
        (connection, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn frame_and_leftover() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();

        peer.write_all(b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET").await.unwrap();

        let (head, payload_size) = connection
            .read_frame(&mut RequestHeadDecoder::default(), Duration::from_secs(5), "reading head", &scope)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.path, "/");

        let content = connection.read_payload(payload_size, usize::MAX, Duration::from_secs(5), &scope).await.unwrap();
        assert_eq!(&content[..], b"abc");
        assert_eq!(&connection.buffer()[..], b"GET");
    }

    #[tokio::test]
    async fn read_times_out() {
        let (mut connection, _peer) = pair().await;

        let err = connection.read_some(Duration::from_millis(50), "reading head").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn tripped_switch_aborts() {
        let (mut connection, _peer) = pair().await;
        let switch = connection.shutdown_switch().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            switch.trip();
        });

        let err = connection.read_some(Duration::ZERO, "reading head").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn stopped_scope_cancels() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();
        scope.stop();

        peer.write_all(b"GET / HT").await.unwrap();
        let err = connection
            .read_frame(&mut RequestHeadDecoder::default(), Duration::from_secs(5), "reading head", &scope)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn body_limit() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();

        peer.write_all(b"0123456789").await.unwrap();
        let err = connection.read_payload(PayloadSize::Length(10), 4, Duration::from_secs(5), &scope).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MessageSize);

        let err = connection.read_payload(PayloadSize::Unframed, 4, Duration::from_secs(5), &scope).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MessageSize);
    }

    #[tokio::test]
    async fn close_delimited_body() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();

        peer.write_all(b"until close").await.unwrap();
        drop(peer);

        let content = connection.read_payload(PayloadSize::Unframed, usize::MAX, Duration::from_secs(5), &scope).await.unwrap();
        assert_eq!(&content[..], b"until close");
    }

    #[tokio::test]
    async fn early_close_is_transport_error() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();

        peer.write_all(b"A str").await.unwrap();
        drop(peer);

        let err = connection.read_payload(PayloadSize::Length(8), usize::MAX, Duration::from_secs(5), &scope).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn trickled_frame_times_out_as_a_whole() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();

        tokio::spawn(async move {
            for byte in b"GET /match/7 HTTP/1.1\r\nX-Padding: aaaaaaaaaaaaaaaa\r\n\r\n" {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if peer.write_all(&[*byte]).await.is_err() {
                    break;
                }
            }
        });

        let started = tokio::time::Instant::now();
        let err = connection
            .read_frame_within(&mut RequestHeadDecoder::default(), Duration::from_millis(100), "reading head", &scope)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn frame_within_deadline() {
        let (mut connection, mut peer) = pair().await;
        let scope = ScopeGuard::new();

        peer.write_all(b"GET /a HTTP/1.1\r\n").await.unwrap();
        peer.write_all(b"\r\n").await.unwrap();
        let (head, _) = connection
            .read_frame_within(&mut RequestHeadDecoder::default(), Duration::from_secs(5), "reading head", &scope)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.path, "/a");
        assert!(connection.is_open());
    }

    #[tokio::test]
    async fn step_finishing_as_timer_fires_is_a_timeout() {
        let (mut connection, _peer) = pair().await;
        let guard = TimeoutGuard::arm(connection.shutdown_switch(), Duration::from_millis(1), "writing response");
        connection.shutdown_switch().tripped().await;

        let err = connection.settle(guard, Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!connection.is_open());
    }
}
