use prefix_proxy::error::UpstreamError;
use prefix_proxy::metrics::{Metrics, Timer};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn test_metrics_new() {
    let snapshot = Metrics::new().snapshot();
    assert_eq!(snapshot.total_requests, 0);
    assert_eq!(snapshot.successful_requests, 0);
    assert_eq!(snapshot.failed_requests, 0);
    assert_eq!(snapshot.no_route, 0);
    assert_eq!(snapshot.bytes_received, 0);
    assert_eq!(snapshot.bytes_sent, 0);
    assert_eq!(snapshot.average_processing_time_ms, 0.0);
    assert_eq!(snapshot.success_rate, 0.0);
}

#[test]
fn test_record_request() {
    let metrics = Metrics::new();
    metrics.record_request(true, Duration::from_millis(10));
    metrics.record_request(true, Duration::from_millis(20));
    metrics.record_request(false, Duration::from_millis(30));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 3);
    assert_eq!(snapshot.successful_requests, 2);
    assert_eq!(snapshot.failed_requests, 1);
    assert!((snapshot.average_processing_time_ms - 20.0).abs() < 0.01);
    assert!((snapshot.success_rate - 66.666).abs() < 0.01);
}

#[test]
fn test_upstream_errors_by_kind() {
    let metrics = Metrics::new();
    metrics.record_upstream_error(&UpstreamError::ConnectionFailed {
        upstream: "127.0.0.1:444".to_string(),
        reason: "refused".to_string(),
    });
    metrics.record_upstream_error(&UpstreamError::StreamReset {
        upstream: "127.0.0.1:444".to_string(),
        reason: "reset".to_string(),
    });
    metrics.record_upstream_error(&UpstreamError::Timeout {
        upstream: "127.0.0.1:444".to_string(),
        timeout: Duration::from_secs(1),
    });
    metrics.record_stream_reset();
    metrics.record_stream_error();
    metrics.record_no_route();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.upstream_connect_failures, 1);
    assert_eq!(snapshot.upstream_resets, 2);
    assert_eq!(snapshot.upstream_errors, 2);
    assert_eq!(snapshot.no_route, 1);
}

#[test]
fn test_bytes_relayed() {
    let metrics = Metrics::new();
    metrics.record_bytes_received(100);
    metrics.record_bytes_received(28);
    metrics.record_bytes_sent(4096);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.bytes_received, 128);
    assert_eq!(snapshot.bytes_sent, 4096);
}

#[test]
fn test_snapshot_serializes_to_json() {
    let metrics = Metrics::new();
    metrics.record_request(true, Duration::from_millis(1));
    let json = serde_json::to_value(metrics.snapshot()).unwrap();
    assert_eq!(json["total_requests"], 1);
    assert_eq!(json["success_rate"], 100.0);
}

#[test]
fn test_metrics_clone_shares_counters() {
    let metrics = Metrics::new();
    let clone = metrics.clone();
    clone.record_no_route();
    assert_eq!(metrics.no_route.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_concurrent_recording() {
    let metrics = Arc::new(Metrics::new());
    let mut handles = Vec::new();
    for _ in 0..10 {
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                metrics.record_request(true, Duration::from_micros(5));
                metrics.record_bytes_sent(1);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 1000);
    assert_eq!(snapshot.bytes_sent, 1000);
}

#[test]
fn test_timer() {
    let timer = Timer::start();
    std::thread::sleep(Duration::from_millis(5));
    assert!(timer.elapsed() >= Duration::from_millis(5));
}
