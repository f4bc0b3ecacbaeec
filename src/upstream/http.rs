use crate::error::{UpstreamError, classify_client_error};
use crate::route::Route;
use crate::upstream::pool::HttpClient;
use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Frame, Incoming, SizeHint};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::http::request::Parts;
use hyper::{Request, Response, Uri, Version};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Body type flowing through the proxy in both directions
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Connection-scoped headers. Each leg negotiates its own framing, so these
/// never cross the proxy.
const HOP_BY_HOP_HEADERS: [&str; 6] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copy headers, dropping hop-by-hop ones.
///
/// `te: trailers` is end-to-end (HTTP/2 and gRPC depend on it) and is kept.
pub fn copy_headers(source: &HeaderMap, target: &mut HeaderMap) {
    for (key, value) in source {
        let trailers_te =
            *key == header::TE && value.as_bytes().eq_ignore_ascii_case(b"trailers");
        if trailers_te || !is_hop_by_hop(key) {
            target.append(key, value.clone());
        }
    }
}

/// Build the request sent to a backend from the client's request head.
///
/// Method and headers are passed through; the URI points at the backend with
/// `upstream_path`. The client's `Host` is kept, or derived from the inbound
/// `:authority` for HTTP/2 clients, which carry no `Host` header.
pub fn build_upstream_request(
    parts: &Parts,
    route: &Route,
    upstream_path: &str,
    body: ProxyBody,
) -> Result<Request<ProxyBody>, UpstreamError> {
    let upstream_uri: Uri = format!("https://{}{}", route.authority(), upstream_path)
        .parse()
        .map_err(|_| UpstreamError::InvalidAddress {
            address: format!("{}{}", route.authority(), upstream_path),
        })?;

    let mut req = Request::builder()
        .method(parts.method.clone())
        .uri(upstream_uri)
        .version(Version::HTTP_11)
        .body(body)
        .map_err(|e| UpstreamError::RequestFailed {
            upstream: route.authority().to_string(),
            reason: format!("Failed to build request: {}", e),
        })?;

    copy_headers(&parts.headers, req.headers_mut());

    if !req.headers().contains_key(header::HOST)
        && let Some(authority) = parts.uri.authority()
        && let Ok(value) = HeaderValue::from_str(authority.as_str())
    {
        req.headers_mut().insert(header::HOST, value);
    }

    Ok(req)
}

/// Request body that reports when the client has finished uploading
struct UploadBody {
    inner: ProxyBody,
    done: Option<oneshot::Sender<()>>,
}

impl UploadBody {
    fn new(inner: ProxyBody) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let mut body = Self {
            inner,
            done: Some(tx),
        };
        if body.inner.is_end_stream() {
            body.finish();
        }
        (body, rx)
    }

    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl Body for UploadBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => self.finish(),
            // Length-delimited bodies may never be polled past their last frame
            Poll::Ready(Some(Ok(_))) if self.inner.is_end_stream() => self.finish(),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Send a request to its backend and wait for the response head.
///
/// The `response_timeout` deadline starts once the client's body has been
/// fully read, so a long upload is never cut short. The response body is
/// streamed afterwards by the caller without a deadline.
pub async fn forward_http_request(
    client: &HttpClient,
    route: &Route,
    req: Request<ProxyBody>,
    response_timeout: Duration,
) -> Result<Response<Incoming>, UpstreamError> {
    debug!(
        "Sending {} request to upstream: {}",
        req.method(),
        req.uri()
    );

    let (parts, body) = req.into_parts();
    let (body, uploaded) = UploadBody::new(body);
    let response = client.request(Request::from_parts(parts, body.boxed()));
    tokio::pin!(response);

    // A dropped sender means the body ended with an error; the request
    // future reports it, so the deadline applies from here too.
    let result = tokio::select! {
        res = &mut response => Ok(res),
        _ = uploaded => tokio::time::timeout(response_timeout, &mut response).await,
    };

    match result {
        Ok(Ok(resp)) => {
            debug!(
                "Received response from upstream {}: {}",
                route.authority(),
                resp.status()
            );
            Ok(resp)
        }
        Ok(Err(e)) => Err(classify_client_error(route.authority(), &e)),
        Err(_) => Err(UpstreamError::Timeout {
            upstream: route.authority().to_string(),
            timeout: response_timeout,
        }),
    }
}
