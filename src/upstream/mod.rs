pub mod http;
pub mod pool;

pub use http::*;
pub use pool::{ConnectionPool, HttpClient};
