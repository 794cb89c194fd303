use std::{fs::File, io::BufReader, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::{Context as _, Result, anyhow};
use hyper_util::{
    rt::{TokioExecutor, TokioIo as HyperSocket, TokioTimer},
    server::conn::auto::Builder,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};
use tracing::{debug, error};

use crate::service::ProxyService;

/// Time a client gets to send a complete request head.
pub const READ_HEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP server that accepts connections and hands them to the proxy service.
///
/// This struct manages the TCP listener, optional TLS termination, and the
/// service every connection is served with.
pub struct Server {
    /// The TCP listener for accepting incoming connections
    connection: TcpListener,
    /// The service that handles proxied requests
    service: ProxyService,
    tls_acceptor: Option<TlsAcceptor>,
    _accept: fn(&Server, ProxyService, TcpStream),
}

impl Server {
    /// Creates a new server instance bound to the specified address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The network address to bind to
    /// * `service` - The proxy service for handling requests
    /// * `tls_acceptor` - Optional TLS acceptor for secure connections
    pub async fn new(
        addr: SocketAddr,
        service: ProxyService,
        tls_acceptor: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let connection = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            _accept: if tls_acceptor.is_some() {
                debug!("Setting up tls acceptor");
                Self::_tls_acceptor
            } else {
                debug!("Setting up non-tls acceptor");
                Self::_non_tls_acceptor
            },
            connection,
            tls_acceptor,
            service,
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    fn _non_tls_acceptor(_: &Self, service: ProxyService, conn: TcpStream) {
        let io = HyperSocket::new(conn);

        tokio::spawn(async move {
            if let Err(e) = connection_builder().serve_connection(io, service).await {
                error!("Error serving non tls connection: {:?}", e);
            }
        });
    }

    fn _tls_acceptor(server: &Self, service: ProxyService, conn: TcpStream) {
        let Some(acceptor) = server.tls_acceptor.clone() else {
            error!("tls acceptor missing, dropping connection");
            return;
        };

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(conn).await {
                Ok(tls_stream) => tls_stream,
                Err(err) => {
                    error!("failed to perform tls handshake: {err:#}");
                    return;
                }
            };
            let io = HyperSocket::new(tls_stream);
            if let Err(e) = connection_builder().serve_connection(io, service).await {
                error!("Error serving tls connection: {:?}", e);
            }
        });
    }

    /// Accepts a new connection and spawns a task to handle it.
    ///
    /// Returns `Ok(())` once the connection is handed off, or an error if
    /// accepting failed.
    pub async fn accept(&self) -> Result<()> {
        let (conn, address) = self.connection.accept().await?;
        debug!("Accepted connection from {}", address);

        let service = self.service.for_peer(address);
        (self._accept)(self, service, conn);
        Ok(())
    }

    /// Accepts connections until the task is dropped. Accept errors are logged.
    pub async fn serve(self) {
        loop {
            if let Err(e) = self.accept().await {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

fn connection_builder() -> Builder<TokioExecutor> {
    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(READ_HEADER_TIMEOUT);
    builder
}

/// Builds a TLS acceptor from PEM encoded certificate chain and private key files.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let mut cert_reader = BufReader::new(
        File::open(cert_path)
            .with_context(|| format!("failed to open certificate {}", cert_path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificate {}", cert_path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", cert_path.display()));
    }

    let mut key_reader = BufReader::new(
        File::open(key_path)
            .with_context(|| format!("failed to open private key {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut key_reader)
        .with_context(|| format!("failed to parse private key {}", key_path.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", key_path.display()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate/key pair")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}
