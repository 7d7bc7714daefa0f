//! Outbound request construction.
//!
//! # Responsibilities
//! - Capture per-request proxy context (remote address, trace headers)
//! - Clone inbound headers for the outbound hop
//! - Describe the outbound request independently of the HTTP client
//!
//! # Design Decisions
//! - Only headers the client regenerates for the new hop are left out
//!   (`Host`, `Transfer-Encoding`, and `Content-Length` when the body was consumed)
//! - `X-Forwarded-For` is appended, so an existing chain is extended
//! - Bodies are either a pre-read buffer or a live stream, chosen per route

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::{GatewayError, GatewayResult};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");
pub const X_CLOUD_TRACE_CONTEXT: HeaderName = HeaderName::from_static("x-cloud-trace-context");

/// Per-request state used to annotate the outbound request.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    remote_addr: SocketAddr,
    traceparent: Option<HeaderValue>,
    cloud_trace: Option<HeaderValue>,
}

impl ProxyContext {
    pub fn new(remote_addr: SocketAddr, inbound: &HeaderMap) -> Self {
        Self {
            remote_addr,
            traceparent: inbound.get(TRACEPARENT).cloned(),
            cloud_trace: inbound.get(X_CLOUD_TRACE_CONTEXT).cloned(),
        }
    }

    /// Trace value handed to workflows: Cloud trace context, then W3C traceparent.
    pub fn trace_value(&self) -> Option<&str> {
        self.cloud_trace
            .as_ref()
            .or(self.traceparent.as_ref())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// Add the forwarding additions to an outbound header set.
    pub fn annotate(&self, headers: &mut HeaderMap) {
        if let Ok(ip) = HeaderValue::from_str(&self.remote_addr.ip().to_string()) {
            headers.append(X_FORWARDED_FOR, ip);
        }
        for (name, value) in [
            (TRACEPARENT, &self.traceparent),
            (X_CLOUD_TRACE_CONTEXT, &self.cloud_trace),
        ] {
            if let Some(value) = value {
                if !headers.contains_key(&name) {
                    headers.insert(name, value.clone());
                }
            }
        }
    }
}

/// Clone the inbound header set for the outbound hop.
pub fn clone_headers(inbound: &HeaderMap, body_consumed: bool) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(header::HOST);
    headers.remove(header::TRANSFER_ENCODING);
    if body_consumed {
        headers.remove(header::CONTENT_LENGTH);
    }
    headers
}

/// Read a whole inbound body, failing once it exceeds `limit` bytes.
pub async fn read_body(body: Body, limit: usize) -> GatewayResult<Bytes> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| GatewayError::MalformedRequest(format!("unreadable body: {}", e)))
}

/// Body of an outbound request.
#[derive(Debug)]
pub enum OutboundBody {
    Empty,
    /// Fully read before forwarding.
    Buffered(Bytes),
    /// Relayed chunk by chunk from the inbound connection.
    Stream(Body),
}

impl OutboundBody {
    /// A streamed body, or `Empty` when the inbound body is known to be empty.
    pub fn stream(body: Body) -> Self {
        if body.size_hint().exact() == Some(0) {
            Self::Empty
        } else {
            Self::Stream(body)
        }
    }

    pub fn into_reqwest(self) -> Option<reqwest::Body> {
        match self {
            Self::Empty => None,
            Self::Buffered(bytes) => Some(reqwest::Body::from(bytes)),
            Self::Stream(body) => Some(reqwest::Body::wrap_stream(body.into_data_stream())),
        }
    }
}

/// Everything needed to issue one upstream call.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: OutboundBody::Empty,
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: OutboundBody) -> Self {
        self.body = body;
        self
    }
}

/// Join the target root with an inbound path and query.
pub fn target_url(target: &str, path_and_query: &str) -> String {
    let root = target.trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{}{}", root, path_and_query)
    } else {
        format!("{}/{}", root, path_and_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert("x-custom", HeaderValue::from_static("one"));
        headers.append("x-custom", HeaderValue::from_static("two"));
        headers.insert(X_CLOUD_TRACE_CONTEXT, HeaderValue::from_static("abc/1;o=1"));
        headers
    }

    #[test]
    fn test_clone_keeps_every_end_to_end_header() {
        let cloned = clone_headers(&inbound(), false);
        assert!(cloned.get(header::HOST).is_none());
        assert_eq!(cloned.get(header::CONTENT_LENGTH).unwrap(), "12");
        let custom: Vec<_> = cloned.get_all("x-custom").iter().collect();
        assert_eq!(custom, ["one", "two"]);

        let consumed = clone_headers(&inbound(), true);
        assert!(consumed.get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_annotate_appends_forwarded_for() {
        let inbound = inbound();
        let ctx = ProxyContext::new("10.0.0.7:55000".parse().unwrap(), &inbound);

        let mut headers = clone_headers(&inbound, false);
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("192.0.2.1"));
        ctx.annotate(&mut headers);

        let chain: Vec<_> = headers.get_all(X_FORWARDED_FOR).iter().collect();
        assert_eq!(chain, ["192.0.2.1", "10.0.0.7"]);
        assert_eq!(headers.get_all(X_CLOUD_TRACE_CONTEXT).iter().count(), 1);
    }

    #[test]
    fn test_annotate_restores_trace_headers() {
        let ctx = ProxyContext::new("127.0.0.1:1".parse().unwrap(), &inbound());
        let mut headers = HeaderMap::new();
        ctx.annotate(&mut headers);
        assert_eq!(headers.get(X_CLOUD_TRACE_CONTEXT).unwrap(), "abc/1;o=1");
        assert!(headers.get(TRACEPARENT).is_none());
    }

    #[test]
    fn test_trace_value_prefers_cloud_trace() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACEPARENT, HeaderValue::from_static("00-abc-def-01"));
        let ctx = ProxyContext::new("127.0.0.1:1".parse().unwrap(), &headers);
        assert_eq!(ctx.trace_value(), Some("00-abc-def-01"));

        headers.insert(X_CLOUD_TRACE_CONTEXT, HeaderValue::from_static("abc"));
        let ctx = ProxyContext::new("127.0.0.1:1".parse().unwrap(), &headers);
        assert_eq!(ctx.trace_value(), Some("abc"));

        let ctx = ProxyContext::new("127.0.0.1:1".parse().unwrap(), &HeaderMap::new());
        assert_eq!(ctx.trace_value(), None);
    }

    #[test]
    fn test_target_url_joins_path_and_query() {
        assert_eq!(
            target_url("https://up.example.com/", "/anything?x=1"),
            "https://up.example.com/anything?x=1"
        );
        assert_eq!(target_url("https://up.example.com", "?a=1"), "https://up.example.com/?a=1");
    }
}
