use crate::error::{ProxyError, ProxyResult, error_chain};
use crate::proxy::handle_http_request;
use crate::server::ServerResources;
use crate::tls_utils;
use anyhow::{Context, Result};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// TLS front end. Serves HTTP/2 (negotiated through ALPN) and HTTP/1.1 on a
/// single port and hands every request to the dispatcher.
pub struct GatewayServer {
    resources: ServerResources,
    acceptor: TlsAcceptor,
    listener: TcpListener,
}

impl GatewayServer {
    /// Load the certificate and key and bind the listening socket.
    ///
    /// Errors here are startup failures: the proxy cannot serve without them.
    pub async fn bind(resources: ServerResources) -> Result<Self> {
        let server_tls_config = tls_utils::create_server_config(&resources.config.tls)
            .await
            .context("Failed to create TLS server config")?;
        let acceptor = TlsAcceptor::from(Arc::new(server_tls_config));

        let bind_addr = resources.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind gateway to {}", bind_addr))?;

        info!("Gateway listening on TCP {}", listener.local_addr()?);

        Ok(Self {
            resources,
            acceptor,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is cancelled
    pub async fn serve(self) -> Result<()> {
        let handshake_timeout =
            Duration::from_secs(self.resources.config.server.handshake_timeout_secs);
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let acceptor = self.acceptor.clone();
                    let resources = self.resources.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(
                            stream,
                            addr,
                            acceptor,
                            handshake_timeout,
                            resources,
                        )
                        .await
                        {
                            warn!("Connection from {} closed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Gateway accept error: {}", e);
                    // Back off before accepting again
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Serve one client connection. Every failure stays inside this task and
    /// closes only this connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        acceptor: TlsAcceptor,
        handshake_timeout: Duration,
        resources: ServerResources,
    ) -> ProxyResult<()> {
        let tls_stream = match timeout(handshake_timeout, acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => tls_stream,
            Ok(Err(e)) => {
                return Err(ProxyError::Protocol(format!("TLS handshake failed: {}", e)));
            }
            Err(_) => {
                return Err(ProxyError::Protocol(format!(
                    "TLS handshake not completed within {:?}",
                    handshake_timeout
                )));
            }
        };

        let negotiated = tls_stream
            .get_ref()
            .1
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_else(|| "none".to_string());
        debug!("TLS established with {} (ALPN: {})", addr, negotiated);

        let io = TokioIo::new(tls_stream);
        let service = service_fn(move |req| {
            let resources = resources.clone();
            async move { Ok::<_, Infallible>(handle_http_request(req, &resources).await) }
        });

        auto::Builder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await
            .map_err(|e| ProxyError::Protocol(error_chain(&*e)))?;

        debug!("Connection from {} closed", addr);
        Ok(())
    }
}
