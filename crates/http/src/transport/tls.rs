//! TLS over TCP with rustls.
//!
//! A [`TlsTransport`] starts out as plain TCP. Bytes written before
//! [`Transport::handshake`] go out unencrypted, which is what a proxy `CONNECT`
//! needs; after the handshake everything is encrypted.

use std::fmt;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::debug;

use super::{DEFAULT_HTTPS_PORT, Destination, Transport, TransportFactory};
use crate::config::{ClientTlsConfig, ServerTlsConfig};
use crate::protocol::HttpError;

const ALPN_HTTP_11: &[u8] = b"http/1.1";

enum Role {
    Client { config: Arc<ClientConfig>, server_name: ServerName<'static> },
    Server { config: Arc<ServerConfig> },
}

enum State {
    Closed,
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

pub struct TlsTransport {
    role: Role,
    state: State,
}

impl TlsTransport {
    /// An unconnected client transport that will verify `server_name`.
    pub fn client(config: Arc<ClientConfig>, server_name: &str) -> Result<Self, HttpError> {
        let server_name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| HttpError::config(format!("invalid server name {server_name:?}: {e}")))?;
        Ok(Self { role: Role::Client { config, server_name }, state: State::Closed })
    }

    /// Wraps an accepted stream; the handshake still has to run.
    pub fn server(config: Arc<ServerConfig>, stream: TcpStream) -> Self {
        Self { role: Role::Server { config }, state: State::Tcp(stream) }
    }

    fn tcp(&self) -> Option<&TcpStream> {
        match &self.state {
            State::Closed => None,
            State::Tcp(stream) => Some(stream),
            State::Tls(stream) => Some(stream.get_ref().0),
        }
    }
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            Role::Client { .. } => "client",
            Role::Server { .. } => "server",
        };
        let state = match self.state {
            State::Closed => "closed",
            State::Tcp(_) => "tcp",
            State::Tls(_) => "tls",
        };
        f.debug_struct("TlsTransport").field("role", &role).field("state", &state).finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
}

#[async_trait]
impl Transport for TlsTransport {
    fn is_open(&self) -> bool {
        !matches!(self.state, State::Closed)
    }

    fn is_secure(&self) -> bool {
        true
    }

    async fn connect(&mut self, address: &str) -> io::Result<()> {
        self.state = State::Closed;
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        self.state = State::Tcp(stream);
        Ok(())
    }

    async fn handshake(&mut self) -> io::Result<()> {
        let stream = match mem::replace(&mut self.state, State::Closed) {
            State::Tcp(stream) => stream,
            State::Tls(stream) => {
                self.state = State::Tls(stream);
                return Ok(());
            }
            State::Closed => return Err(not_connected()),
        };

        let stream: TlsStream<TcpStream> = match &self.role {
            Role::Client { config, server_name } => {
                TlsConnector::from(Arc::clone(config)).connect(server_name.clone(), stream).await?.into()
            }
            Role::Server { config } => TlsAcceptor::from(Arc::clone(config)).accept(stream).await?.into(),
        };
        debug!(protocol = ?stream.get_ref().1.protocol_version(), "tls handshake finished");
        self.state = State::Tls(Box::new(stream));
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Closed => Ok(()),
            State::Tcp(mut stream) => stream.shutdown().await,
            // sends close_notify before the TCP FIN
            State::Tls(mut stream) => stream.shutdown().await,
        }
    }

    fn close(&mut self) {
        self.state = State::Closed;
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.tcp().and_then(|s| s.peer_addr().ok())
    }
}

impl AsyncRead for TlsTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Closed => Poll::Ready(Err(not_connected())),
            State::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TlsTransport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().state {
            State::Closed => Poll::Ready(Err(not_connected())),
            State::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Closed => Poll::Ready(Ok(())),
            State::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Closed => Poll::Ready(Ok(())),
            State::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Creates client [`TlsTransport`]s sharing one rustls configuration.
#[derive(Debug, Clone)]
pub struct TlsClientFactory {
    config: Arc<ClientConfig>,
}

impl TlsClientFactory {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    pub fn from_config(tls: &ClientTlsConfig) -> Result<Self, HttpError> {
        Ok(Self::new(tls_client_config(tls)?))
    }
}

impl TransportFactory for TlsClientFactory {
    fn create(&self, destination: &Destination) -> Result<Box<dyn Transport>, HttpError> {
        Ok(Box::new(TlsTransport::client(Arc::clone(&self.config), destination.host())?))
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn default_port(&self) -> u16 {
        DEFAULT_HTTPS_PORT
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_error<E: fmt::Display>(e: E) -> HttpError {
    HttpError::config(format!("tls setup failed: {e}"))
}

/// Loads every certificate in a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, HttpError> {
    let certificates = CertificateDer::pem_file_iter(path)
        .and_then(|certificates| certificates.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HttpError::config(format!("cannot read certificates from {}: {e}", path.display())))?;
    if certificates.is_empty() {
        return Err(HttpError::config(format!("no certificate found in {}", path.display())));
    }
    Ok(certificates)
}

/// Loads the first private key in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, HttpError> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| HttpError::config(format!("cannot read private key from {}: {e}", path.display())))
}

fn root_store(verify_file: Option<&Path>, with_public_roots: bool) -> Result<RootCertStore, HttpError> {
    let mut roots = RootCertStore::empty();
    if with_public_roots {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    if let Some(path) = verify_file {
        for certificate in load_certificates(path)? {
            roots.add(certificate).map_err(tls_error)?;
        }
    }
    Ok(roots)
}

/// Builds the rustls client configuration described by `tls`.
pub fn tls_client_config(tls: &ClientTlsConfig) -> Result<Arc<ClientConfig>, HttpError> {
    let provider = crypto_provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions().map_err(tls_error)?;

    let builder = if tls.verify_certificate {
        builder.with_root_certificates(root_store(tls.verify_file.as_deref(), true)?)
    } else {
        builder.dangerous().with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
    };

    let mut config = match (&tls.certification_file, &tls.private_key_file) {
        (Some(certification_file), Some(private_key_file)) => builder
            .with_client_auth_cert(load_certificates(certification_file)?, load_private_key(private_key_file)?)
            .map_err(tls_error)?,
        _ => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![ALPN_HTTP_11.to_vec()];
    Ok(Arc::new(config))
}

/// Builds the rustls server configuration described by `tls`.
pub fn tls_server_config(tls: &ServerTlsConfig) -> Result<Arc<ServerConfig>, HttpError> {
    let provider = crypto_provider();
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions().map_err(tls_error)?;

    let builder = match &tls.verify_file {
        Some(path) => {
            let roots = Arc::new(root_store(Some(path), false)?);
            let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider).build().map_err(tls_error)?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder
        .with_single_cert(load_certificates(&tls.certification_file)?, load_private_key(&tls.private_key_file)?)
        .map_err(tls_error)?;
    config.alpn_protocols = vec![ALPN_HTTP_11.to_vec()];
    Ok(Arc::new(config))
}

/// Skips certificate checks while still validating handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
