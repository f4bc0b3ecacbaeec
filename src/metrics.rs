/// Relay counters and timing
use crate::error::UpstreamError;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collector shared by every exchange
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Total number of exchanges dispatched
    pub total_requests: Arc<AtomicU64>,
    /// Exchanges that received backend response headers
    pub successful_requests: Arc<AtomicU64>,
    /// Exchanges answered with a proxy-generated error
    pub failed_requests: Arc<AtomicU64>,
    /// Requests rejected because no route matched
    pub no_route: Arc<AtomicU64>,
    /// Backend connect failures
    pub upstream_connect_failures: Arc<AtomicU64>,
    /// Backend resets, before or after response headers
    pub upstream_resets: Arc<AtomicU64>,
    /// Other upstream errors, timeouts included
    pub upstream_errors: Arc<AtomicU64>,
    /// Request body bytes relayed to backends
    pub bytes_received: Arc<AtomicU64>,
    /// Response body bytes relayed to clients
    pub bytes_sent: Arc<AtomicU64>,
    /// Cumulative time to response headers in microseconds
    pub total_processing_time_us: Arc<AtomicU64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_requests: Arc::new(AtomicU64::new(0)),
            successful_requests: Arc::new(AtomicU64::new(0)),
            failed_requests: Arc::new(AtomicU64::new(0)),
            no_route: Arc::new(AtomicU64::new(0)),
            upstream_connect_failures: Arc::new(AtomicU64::new(0)),
            upstream_resets: Arc::new(AtomicU64::new(0)),
            upstream_errors: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            total_processing_time_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record the outcome of an exchange
    pub fn record_request(&self, success: bool, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_no_route(&self) {
        self.no_route.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upstream failure by kind
    pub fn record_upstream_error(&self, error: &UpstreamError) {
        let counter = match error {
            UpstreamError::ConnectionFailed { .. } => &self.upstream_connect_failures,
            UpstreamError::StreamReset { .. } => &self.upstream_resets,
            _ => &self.upstream_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a backend reset after the response started streaming
    pub fn record_stream_reset(&self) {
        self.upstream_resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a non-reset backend body error
    pub fn record_stream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let total_time_us = self.total_processing_time_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            no_route: self.no_route.load(Ordering::Relaxed),
            upstream_connect_failures: self.upstream_connect_failures.load(Ordering::Relaxed),
            upstream_resets: self.upstream_resets.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            average_processing_time_ms: if total > 0 {
                (total_time_us as f64 / total as f64) / 1000.0
            } else {
                0.0
            },
            success_rate: if total > 0 {
                (successful as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of current metrics, served as JSON by the healthcheck listener
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub no_route: u64,
    pub upstream_connect_failures: u64,
    pub upstream_resets: u64,
    pub upstream_errors: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub average_processing_time_ms: f64,
    pub success_rate: f64,
}

/// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
