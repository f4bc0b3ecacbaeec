pub mod http;

pub use http::handle_http_request;
