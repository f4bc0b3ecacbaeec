pub mod app;
pub mod config;
pub mod error;
pub mod listeners;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod route;
pub mod routing;
pub mod server;
pub mod tls_utils;
pub mod upstream;

// Re-export commonly used types for convenience
pub use config::{AppConfig, MatchMode, RouteConfig, UpstreamConfig};
pub use route::{Route, RouteMatch, RouteMatcher};
pub use routing::RouteTable;
