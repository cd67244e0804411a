use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

use super::{DEFAULT_HTTP_PORT, Destination, Transport, TransportFactory};
use crate::protocol::HttpError;

/// Plain TCP.
#[derive(Debug, Default)]
pub struct PlainTransport {
    stream: Option<TcpStream>,
}

impl PlainTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an accepted stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream: Some(stream) }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
}

#[async_trait]
impl Transport for PlainTransport {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn is_secure(&self) -> bool {
        false
    }

    async fn connect(&mut self, address: &str) -> io::Result<()> {
        self.stream = None;
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn handshake(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(mut stream) => stream.shutdown().await,
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

impl AsyncRead for PlainTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for PlainTransport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().stream {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFactory;

impl TransportFactory for PlainFactory {
    fn create(&self, _destination: &Destination) -> Result<Box<dyn Transport>, HttpError> {
        Ok(Box::new(PlainTransport::new()))
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn default_port(&self) -> u16 {
        DEFAULT_HTTP_PORT
    }
}
