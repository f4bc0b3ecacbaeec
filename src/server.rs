/// Common server startup utilities
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::routing::RouteTableType;
use crate::upstream::ConnectionPool;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Common server startup helper
pub struct ServerStarter;

impl ServerStarter {
    /// Spawn a bound server's accept loop, logging if it ever stops with an error
    pub fn start_server<Fut>(name: &str, bind_addr: String, server_future: Fut) -> JoinHandle<()>
    where
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.to_string();
        info!("{} server started on {}", name, bind_addr);
        tokio::spawn(async move {
            if let Err(e) = server_future.await {
                error!("{} server error: {:#}", name, e);
            }
        })
    }
}

/// Resources shared by every connection and exchange
#[derive(Clone)]
pub struct ServerResources {
    pub config: Arc<AppConfig>,
    pub routes: RouteTableType,
    pub pool: Arc<ConnectionPool>,
    pub metrics: Arc<Metrics>,
}

impl ServerResources {
    pub fn new(
        config: Arc<AppConfig>,
        routes: RouteTableType,
        pool: Arc<ConnectionPool>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            routes,
            pool,
            metrics,
        }
    }

    /// Maximum wait for backend response headers
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.config.upstream.response_timeout_secs)
    }
}
