use crate::config::UpstreamConfig;
use crate::error::ProxyResult;
use crate::route::Route;
use crate::tls_utils::create_client_config;
use crate::upstream::http::ProxyBody;
use dashmap::DashMap;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default keepalive timeout (60 seconds)
const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds)
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default max idle connections per backend
const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 10;

/// HTTP client type with HTTPS support
pub type HttpClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

/// Pool key: backend authority and whether its certificate is verified
type PoolKey = (String, bool);

/// Keeps one HTTP client per backend so that exchanges to the same backend
/// reuse keepalive connections. Safe to share between tasks.
pub struct ConnectionPool {
    clients: Arc<DashMap<PoolKey, Arc<HttpClient>>>,
    keepalive_timeout: Duration,
    connection_timeout: Duration,
    max_idle_connections: usize,
}

impl ConnectionPool {
    /// Create a new connection pool with default settings
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_KEEPALIVE_TIMEOUT,
            DEFAULT_CONNECTION_TIMEOUT,
            DEFAULT_MAX_IDLE_CONNECTIONS,
        )
    }

    /// Create a new connection pool with custom configuration
    pub fn with_config(
        keepalive_timeout: Duration,
        connection_timeout: Duration,
        max_idle_connections: usize,
    ) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            keepalive_timeout,
            connection_timeout,
            max_idle_connections,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::with_config(
            Duration::from_secs(config.keepalive_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
            config.max_idle_connections,
        )
    }

    /// Get or create the client for a route's backend
    pub fn get_client(&self, route: &Route) -> ProxyResult<Arc<HttpClient>> {
        let key = (route.authority().to_string(), route.skip_verify);

        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(client.value()));
        }

        let entry = self.clients.entry(key).or_try_insert_with(|| {
            debug!("Creating HTTP client for backend: {}", route.authority());
            if route.skip_verify {
                warn!(
                    "Certificate verification disabled for backend {}",
                    route.authority()
                );
            }
            self.create_client(route.skip_verify).map(Arc::new)
        })?;

        Ok(Arc::clone(entry.value()))
    }

    /// Number of backends with a client
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn create_client(&self, skip_verify: bool) -> ProxyResult<HttpClient> {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(true);
        http_connector.set_keepalive(Some(self.keepalive_timeout));
        http_connector.set_connect_timeout(Some(self.connection_timeout));

        let https_connector = HttpsConnectorBuilder::new()
            .with_tls_config(create_client_config(skip_verify)?)
            .https_only()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        // Host is carried over from the client request, never set to the backend
        Ok(Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(self.max_idle_connections)
            .pool_idle_timeout(self.keepalive_timeout)
            .pool_timer(TokioTimer::new())
            .set_host(false)
            .build(https_connector))
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
