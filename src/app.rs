use crate::config::AppConfig;
use crate::listeners::{GatewayServer, HealthcheckServer};
use crate::metrics::Metrics;
use crate::routing::{RouteTableType, create_route_table};
use crate::server::{ServerResources, ServerStarter};
use crate::upstream::ConnectionPool;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct App {
    config: Arc<AppConfig>,
    pub routes: RouteTableType,
    metrics: Arc<Metrics>,
    pool: Arc<ConnectionPool>,
    handles: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    healthcheck_addr: Option<SocketAddr>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let routes = create_route_table(&config);
        let pool = Arc::new(ConnectionPool::from_config(&config.upstream));
        Self {
            config: Arc::new(config),
            routes,
            metrics: Arc::new(Metrics::new()),
            pool,
            handles: Vec::new(),
            local_addr: None,
            healthcheck_addr: None,
        }
    }

    /// Load TLS material, bind the listeners and spawn their accept loops.
    ///
    /// Returns once everything is bound; a missing certificate or key, or a
    /// port that cannot be bound, is returned as an error.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting proxy with {} routes", self.routes.len());
        for route in self.routes.routes().iter().rev() {
            let prefix = if route.is_catch_all() {
                "<catch-all>"
            } else {
                route.path_prefix.as_str()
            };
            info!("Route {} -> {}", prefix, route.authority());
            if route.skip_verify {
                warn!(
                    "Route {} skips certificate verification of {}",
                    prefix,
                    route.authority()
                );
            }
        }

        let resources = ServerResources::new(
            Arc::clone(&self.config),
            Arc::clone(&self.routes),
            Arc::clone(&self.pool),
            Arc::clone(&self.metrics),
        );

        let gateway = GatewayServer::bind(resources).await?;
        let addr = gateway.local_addr()?;
        self.local_addr = Some(addr);
        self.handles.push(ServerStarter::start_server(
            "Gateway",
            addr.to_string(),
            gateway.serve(),
        ));

        if self.config.healthcheck.enabled {
            let healthcheck =
                HealthcheckServer::bind(&self.config.healthcheck, Arc::clone(&self.metrics))
                    .await?;
            let addr = healthcheck.local_addr()?;
            self.healthcheck_addr = Some(addr);
            self.handles.push(ServerStarter::start_server(
                "Healthcheck",
                addr.to_string(),
                healthcheck.serve(),
            ));
        } else {
            info!("Healthcheck server is disabled");
        }

        info!("All enabled servers started");
        Ok(())
    }

    /// Address the TLS front end is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn healthcheck_addr(&self) -> Option<SocketAddr> {
        self.healthcheck_addr
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Stop accepting connections and wait for the accept loops to finish
    pub async fn wait_for_shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        info!("All servers stopped");
    }
}
