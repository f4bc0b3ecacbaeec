use crate::error::{ProxyError, ProxyResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Backends in declaration order. Later entries are more specific and
    /// are tried first.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connections that have not finished the TLS handshake by then are closed
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain file path (PEM format)
    #[serde(default = "default_cert_file")]
    pub cert_file: String,
    /// Private key file path (PEM format)
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Skip certificate chain verification toward backends. Backends are
    /// expected to be co-located services with self-signed certificates;
    /// turn this off as soon as a backend is reachable over a real network.
    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,
    /// Maximum wait for backend response headers
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_max_idle")]
    pub max_idle_connections: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub match_mode: MatchMode,
}

/// How a route prefix is compared against the request path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Plain byte-wise prefix test: `/apiextra` matches `/api`.
    #[default]
    Prefix,
    /// The prefix must end on a path segment boundary: `/apiextra` does
    /// not match `/api`, `/api/x` and `/api?x` do.
    Segment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub host: String,
    pub port: u16,
    /// URL prefix owned by this backend. Empty means catch-all.
    #[serde(default)]
    pub path_prefix: String,
    /// Per-route override of `upstream.insecure_skip_verify`
    #[serde(default)]
    pub insecure_skip_verify: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_healthcheck_port")]
    pub port: u16,
    #[serde(default = "default_healthcheck_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path. Console only when unset.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
    /// Daily rotation of the log file
    #[serde(default = "default_true")]
    pub rotation: bool,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_cert_file() -> String {
    "./server.crt".to_string()
}

fn default_key_file() -> String {
    "./server.key".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_response_timeout() -> u64 {
    30
}

fn default_max_idle() -> usize {
    10
}

fn default_healthcheck_port() -> u16 {
    8080
}

fn default_healthcheck_path() -> String {
    "/health".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig {
            host: "127.0.0.1".to_string(),
            port: 444,
            path_prefix: String::new(),
            insecure_skip_verify: None,
        },
        RouteConfig {
            host: "127.0.0.1".to_string(),
            port: 446,
            path_prefix: "/api".to_string(),
            insecure_skip_verify: None,
        },
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_file: default_cert_file(),
            key_file: default_key_file(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            insecure_skip_verify: true,
            connect_timeout_secs: default_connect_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            response_timeout_secs: default_response_timeout(),
            max_idle_connections: default_max_idle(),
        }
    }
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_healthcheck_port(),
            path: default_healthcheck_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
            rotation: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tls: TlsConfig::default(),
            upstream: UpstreamConfig::default(),
            routing: RoutingConfig::default(),
            routes: default_routes(),
            healthcheck: HealthcheckConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RouteConfig {
    pub fn new(host: impl Into<String>, port: u16, path_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path_prefix: path_prefix.into(),
            insecure_skip_verify: None,
        }
    }

    /// `host:port` of the backend
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn skip_verify(&self, upstream: &UpstreamConfig) -> bool {
        self.insecure_skip_verify
            .unwrap_or(upstream.insecure_skip_verify)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration from file, or the built-in defaults when the file
    /// does not exist. A file that exists but cannot be read or parsed is an
    /// error, never a silent fallback.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::metadata(path.as_ref()) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            _ => Self::from_file(path),
        }
    }

    /// Apply `HOST` and `PORT` from the process environment
    pub fn apply_env_overrides(&mut self) -> ProxyResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `HOST` and `PORT` overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ProxyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
            self.server.bind_address = host;
        }

        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ProxyError::Config(format!("Invalid PORT value: {}", port)))?;
        }

        Ok(())
    }

    /// Listening address of the TLS front end
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Validate configuration before starting
    pub fn validate(&self) -> ProxyResult<()> {
        if self.routes.is_empty() {
            return Err(ProxyError::Config("No routes configured".to_string()));
        }

        let mut catch_all = 0;
        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.host.is_empty() {
                return Err(ProxyError::Config(format!(
                    "Route '{}' has an empty backend host",
                    route.path_prefix
                )));
            }
            if route.port == 0 {
                return Err(ProxyError::Config(format!(
                    "Route '{}' has an invalid backend port 0",
                    route.path_prefix
                )));
            }
            if route.path_prefix.is_empty() {
                catch_all += 1;
                if catch_all > 1 {
                    return Err(ProxyError::Config(
                        "At most one catch-all route (empty prefix) is allowed".to_string(),
                    ));
                }
            } else if !route.path_prefix.starts_with('/') {
                return Err(ProxyError::Config(format!(
                    "Route prefix '{}' must start with '/'",
                    route.path_prefix
                )));
            }
            if !seen.insert(route.path_prefix.as_str()) {
                return Err(ProxyError::Config(format!(
                    "Duplicate route prefix '{}'",
                    route.path_prefix
                )));
            }
        }

        if self.tls.cert_file.is_empty() || self.tls.key_file.is_empty() {
            return Err(ProxyError::Config(
                "TLS certificate and key files must be configured".to_string(),
            ));
        }

        if self.server.handshake_timeout_secs == 0 {
            return Err(ProxyError::Config(
                "server.handshake_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.upstream.response_timeout_secs == 0 {
            return Err(ProxyError::Config(
                "upstream.response_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.healthcheck.enabled {
            if self.healthcheck.port != 0
                && self.healthcheck.bind_address == self.server.bind_address
                && self.healthcheck.port == self.server.port
            {
                return Err(ProxyError::Config(format!(
                    "Healthcheck port {} conflicts with the proxy port",
                    self.healthcheck.port
                )));
            }
            if !self.healthcheck.path.starts_with('/') {
                return Err(ProxyError::Config(format!(
                    "Healthcheck path '{}' must start with '/'",
                    self.healthcheck.path
                )));
            }
        }

        Ok(())
    }
}
