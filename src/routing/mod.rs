pub mod table;

use crate::config::AppConfig;
use std::sync::Arc;

pub use table::RouteTable;

/// Shared route table used by every exchange
pub type RouteTableType = Arc<RouteTable>;

/// Build the route table from configuration
pub fn create_route_table(config: &AppConfig) -> RouteTableType {
    Arc::new(RouteTable::from_config(config))
}
