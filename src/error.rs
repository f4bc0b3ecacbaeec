/// Error types for the proxy
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Main error type for proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate errors, fatal at startup
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Route lookup errors
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    /// Upstream connection errors
    #[error("Upstream connection error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed inbound data
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Certificate-related errors
#[derive(Error, Debug)]
pub enum CertificateError {
    /// Certificate or key file not found
    #[error("Certificate file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to read or parse a file
    #[error("Failed to load certificate from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// PEM file contained no certificate
    #[error("No certificates found in {path}")]
    NoCertificates { path: String },

    /// Private key error
    #[error("Private key error in {path}: {reason}")]
    PrivateKey { path: String, reason: String },
}

/// Route lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No configured prefix matches the request path
    #[error("No route matched path: {path}")]
    NoRouteMatched { path: String },
}

/// Upstream connection errors
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Backend unreachable
    #[error("Failed to connect to upstream {upstream}: {reason}")]
    ConnectionFailed { upstream: String, reason: String },

    /// Backend dropped the connection mid-transfer
    #[error("Upstream connection {upstream} reset: {reason}")]
    StreamReset { upstream: String, reason: String },

    /// Any other request failure
    #[error("Upstream request failed to {upstream}: {reason}")]
    RequestFailed { upstream: String, reason: String },

    /// No response headers in time
    #[error("Upstream request timeout to {upstream} after {timeout:?}")]
    Timeout {
        upstream: String,
        timeout: std::time::Duration,
    },

    /// Invalid upstream address
    #[error("Invalid upstream address: {address}")]
    InvalidAddress { address: String },
}

/// Result type alias for convenience
pub type ProxyResult<T> = Result<T, ProxyError>;

impl UpstreamError {
    /// Connection refused or reset: expected when a backend restarts,
    /// logged as a warning rather than an error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::ConnectionFailed { .. } | UpstreamError::StreamReset { .. }
        )
    }
}

/// Map an error from the upstream client to connect, reset or other.
///
/// `is_connect` is checked first; otherwise the source chain is searched for
/// an I/O error whose kind signals that the peer went away.
pub fn classify_client_error(
    upstream: &str,
    err: &hyper_util::client::legacy::Error,
) -> UpstreamError {
    let reason = error_chain(err);
    if err.is_connect() {
        return UpstreamError::ConnectionFailed {
            upstream: upstream.to_string(),
            reason,
        };
    }
    if is_reset(err) {
        return UpstreamError::StreamReset {
            upstream: upstream.to_string(),
            reason,
        };
    }
    UpstreamError::RequestFailed {
        upstream: upstream.to_string(),
        reason,
    }
}

/// True if any error in the chain is a peer reset, abort or broken pipe,
/// hyper's own "connection closed before message completed", or an HTTP/2
/// `RST_STREAM`/`GOAWAY`.
pub fn is_reset(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>()
            && (hyper_err.is_incomplete_message() || hyper_err.is_closed())
        {
            return true;
        }
        if let Some(h2_err) = e.downcast_ref::<h2::Error>()
            && (h2_err.is_reset() || h2_err.is_go_away())
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Render an error and its sources as `a: b: c`
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        out.push_str(": ");
        out.push_str(&e.to_string());
        current = e.source();
    }
    out
}
