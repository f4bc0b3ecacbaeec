use crate::config::HealthcheckConfig;
use crate::metrics::Metrics;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Plain HTTP liveness and metrics endpoint
pub struct HealthcheckServer {
    path: String,
    metrics: Arc<Metrics>,
    listener: TcpListener,
}

impl HealthcheckServer {
    pub async fn bind(config: &HealthcheckConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind healthcheck server to {}", bind_addr))?;

        info!(
            "Healthcheck server listening on {} at path {}",
            listener.local_addr()?,
            config.path
        );

        Ok(Self {
            path: config.path.clone(),
            metrics,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self) -> Result<()> {
        let healthcheck_path: Arc<str> = Arc::from(self.path.as_str());

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let path = Arc::clone(&healthcheck_path);
                    let metrics = Arc::clone(&self.metrics);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let path = Arc::clone(&path);
                            let metrics = Arc::clone(&metrics);
                            async move {
                                Ok::<_, Infallible>(handle_healthcheck(req, &path, &metrics))
                            }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Healthcheck connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Healthcheck accept error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn handle_healthcheck(
    req: Request<hyper::body::Incoming>,
    healthcheck_path: &str,
    metrics: &Metrics,
) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        let mut response = Response::new(Full::new(Bytes::from("Method not allowed")));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return response;
    }

    let path = req.uri().path();

    if path == "/metrics" || path == "/stats" {
        let body = serde_json::to_string(&metrics.snapshot())
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
        return json_response(StatusCode::OK, body);
    }

    if path != healthcheck_path {
        let mut response = Response::new(Full::new(Bytes::from("Not found")));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return response;
    }

    let body = serde_json::json!({
        "status": "healthy",
        "service": "prefix-proxy"
    });
    json_response(StatusCode::OK, body.to_string())
}
