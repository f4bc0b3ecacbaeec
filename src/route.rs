use crate::config::{RouteConfig, UpstreamConfig};

/// One backend and the URL prefix it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub host: String,
    pub port: u16,
    pub path_prefix: String,
    /// Skip certificate chain verification toward this backend
    pub skip_verify: bool,
    authority: String,
}

impl Route {
    pub fn new(host: impl Into<String>, port: u16, path_prefix: impl Into<String>) -> Self {
        let host = host.into();
        let authority = format!("{}:{}", host, port);
        Self {
            host,
            port,
            path_prefix: path_prefix.into(),
            skip_verify: true,
            authority,
        }
    }

    pub fn from_config(config: &RouteConfig, upstream: &UpstreamConfig) -> Self {
        let mut route = Self::new(config.host.clone(), config.port, config.path_prefix.clone());
        route.skip_verify = config.skip_verify(upstream);
        route
    }

    /// `host:port` of the backend
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_catch_all(&self) -> bool {
        self.path_prefix.is_empty()
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    /// Path and query to send upstream, prefix removed
    pub upstream_path: String,
}

pub trait RouteMatcher {
    /// Find the route owning `path` (path plus optional query string).
    fn match_path(&self, path: &str) -> Option<RouteMatch<'_>>;
}
