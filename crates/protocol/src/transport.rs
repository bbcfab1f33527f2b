//! Transport setup: TCP dialing and mutual-TLS wrapping
//!
//! Every server and dialer in the pipeline works against the `Stream`
//! enum, so the same framed read/write paths serve plain loopback TCP
//! in tests and mutually-authenticated TLS in deployment.
//!
//! Credential loading is fatal on failure; the binary edge turns that
//! into a non-zero exit.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig, server::WebPkiClientVerifier};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::{ProtocolError, Result};

/// Paths to the mutual-TLS credential trio
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Build a TLS acceptor that requires client certificates signed by
/// the configured CA
pub fn server_tls(paths: &TlsPaths) -> Result<TlsAcceptor> {
    let roots = load_roots(&paths.ca)?;
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| ProtocolError::Tls(format!("client verifier: {e}")))?;

    let certs = load_certs(&paths.cert)?;
    let key = load_key(&paths.key)?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ProtocolError::Tls(format!("server config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build a TLS connector presenting the configured client certificate
pub fn client_tls(paths: &TlsPaths) -> Result<TlsConnector> {
    let roots = load_roots(&paths.ca)?;
    let certs = load_certs(&paths.cert)?;
    let key = load_key(&paths.key)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| ProtocolError::Tls(format!("client config: {e}")))?;

    Ok(TlsConnector::from(Arc::new(config)))
}

fn load_roots(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| ProtocolError::Tls(format!("CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(ProtocolError::Tls(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| ProtocolError::Tls(format!("open {}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| ProtocolError::Tls(format!("parse {}: {e}", path.display())))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| ProtocolError::Tls(format!("open {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ProtocolError::Tls(format!("parse {}: {e}", path.display())))?
        .ok_or_else(|| ProtocolError::Tls(format!("no private key in {}", path.display())))
}

/// A plain or TLS-wrapped connection
///
/// Framed I/O is written against this enum so transport choice stays a
/// wiring decision.
pub enum Stream {
    Plain(TcpStream),
    ServerTls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
    ClientTls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Stream {
    /// Wrap an accepted connection, running the TLS handshake when an
    /// acceptor is configured
    pub async fn accept(tcp: TcpStream, acceptor: Option<&TlsAcceptor>) -> io::Result<Self> {
        match acceptor {
            Some(acceptor) => Ok(Stream::ServerTls(Box::new(acceptor.accept(tcp).await?))),
            None => Ok(Stream::Plain(tcp)),
        }
    }

    /// Dial an address, running the TLS handshake when a connector is
    /// configured
    pub async fn connect(addr: &str, connector: Option<&TlsConnector>) -> Result<Self> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true).ok();

        // Keep-alive catches half-dead peers on long-lived streams;
        // failure to set it is not fatal.
        let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(30));
        SockRef::from(&tcp).set_tcp_keepalive(&keepalive).ok();
        match connector {
            Some(connector) => {
                let host = addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(addr);
                let name = ServerName::try_from(host.to_string())
                    .map_err(|e| ProtocolError::Tls(format!("server name {host}: {e}")))?;
                let tls = connector.connect(name, tcp).await?;
                Ok(Stream::ClientTls(Box::new(tls)))
            }
            None => Ok(Stream::Plain(tcp)),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
