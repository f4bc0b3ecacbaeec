use crate::error::{UpstreamError, is_reset};
use crate::metrics::{Metrics, Timer};
use crate::route::Route;
use crate::server::ServerResources;
use crate::upstream::http::{
    ProxyBody, build_upstream_request, copy_headers, forward_http_request,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Frame, Incoming};
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Route one exchange: match the path, strip the prefix and relay to the
/// backend.
///
/// Always yields a response. No route gives 404, an unreachable backend 502,
/// a backend that sends no headers in time 504. Failures after the response
/// head was sent surface as an aborted body stream on this exchange only.
pub async fn handle_http_request(
    req: Request<Incoming>,
    resources: &ServerResources,
) -> Response<ProxyBody> {
    let timer = Timer::start();
    let metrics = &resources.metrics;
    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let matched = match resources.routes.resolve(&path) {
        Ok(m) => m,
        Err(e) => {
            debug!("{} {}: {}", method, path, e);
            metrics.record_no_route();
            metrics.record_request(false, timer.elapsed());
            return text_response(StatusCode::NOT_FOUND, "No route matched");
        }
    };
    let route = matched.route;

    info!(
        "{} {} -> {}{}",
        method,
        path,
        route.authority(),
        matched.upstream_path
    );

    let client = match resources.pool.get_client(route) {
        Ok(client) => client,
        Err(e) => {
            error!("No upstream client for {}: {}", route.authority(), e);
            metrics.record_request(false, timer.elapsed());
            return text_response(StatusCode::BAD_GATEWAY, "Upstream unavailable");
        }
    };

    let (parts, body) = req.into_parts();
    let body = relay_request_body(body, Arc::clone(metrics));
    let result = match build_upstream_request(&parts, route, &matched.upstream_path, body) {
        Ok(upstream_req) => {
            forward_http_request(&client, route, upstream_req, resources.response_timeout()).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            metrics.record_request(true, timer.elapsed());
            relay_response(response, route, Arc::clone(metrics))
        }
        Err(e) => {
            if e.is_transient() {
                warn!("{} {} failed: {}", method, path, e);
            } else {
                error!("{} {} failed: {}", method, path, e);
            }
            metrics.record_upstream_error(&e);
            metrics.record_request(false, timer.elapsed());
            upstream_error_response(&e)
        }
    }
}

/// Stream the client's body upstream frame by frame, counting bytes
fn relay_request_body(body: Incoming, metrics: Arc<Metrics>) -> ProxyBody {
    body.map_frame(move |frame: Frame<Bytes>| {
        if let Some(data) = frame.data_ref() {
            metrics.record_bytes_received(data.len() as u64);
        }
        frame
    })
    .map_err(|e| {
        debug!("Client request body ended with error: {}", e);
        e
    })
    .boxed()
}

/// Pass the backend's status and headers through and stream its body back
fn relay_response(
    response: Response<Incoming>,
    route: &Route,
    metrics: Arc<Metrics>,
) -> Response<ProxyBody> {
    let (parts, body) = response.into_parts();
    let authority = route.authority().to_string();
    let frame_metrics = Arc::clone(&metrics);

    let body = body
        .map_frame(move |frame: Frame<Bytes>| {
            if let Some(data) = frame.data_ref() {
                frame_metrics.record_bytes_sent(data.len() as u64);
            }
            frame
        })
        .map_err(move |e| {
            if is_reset(&e) {
                warn!("Upstream {} reset mid-stream: {}", authority, e);
                metrics.record_stream_reset();
            } else {
                error!("Upstream {} body error: {}", authority, e);
                metrics.record_stream_error();
            }
            e
        })
        .boxed();

    let mut builder = Response::builder().status(parts.status);
    if let Some(headers) = builder.headers_mut() {
        copy_headers(&parts.headers, headers);
    }
    builder
        .body(body)
        .unwrap_or_else(|_| text_response(StatusCode::BAD_GATEWAY, "Invalid upstream response"))
}

fn upstream_error_response(error: &UpstreamError) -> Response<ProxyBody> {
    match error {
        UpstreamError::Timeout { .. } => {
            text_response(StatusCode::GATEWAY_TIMEOUT, "Upstream timeout")
        }
        _ => text_response(StatusCode::BAD_GATEWAY, "Upstream error"),
    }
}

/// Plain-text response generated by the proxy itself
pub fn text_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let body: ProxyBody = Full::new(Bytes::from_static(message.as_bytes()))
        .map_err(|never| match never {})
        .boxed();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
