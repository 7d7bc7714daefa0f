//! Forwarding engine.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → ClientFactory::new_client   (AuthClientConstruction on failure)
//!     → OutboundRequest             (method, target + path, cloned headers, body)
//!     → ProxyContext::annotate      (X-Forwarded-For, trace headers)
//!     → UpstreamClient::execute     (UpstreamUnreachable on failure)
//!     → response::relay             (status, Content-Type, streamed body)
//! ```
//!
//! # Design Decisions
//! - POST bodies are buffered (logged, then re-framed); GET and DELETE stream
//! - No retries and no circuit breaking
//! - The upstream call lives inside the handler future; a caller disconnect
//!   drops it and aborts the upstream request

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
};
use bytes::Bytes;
use std::sync::Arc;

use crate::error::GatewayResult;
use crate::http::client::ClientFactory;
use crate::http::query::body_to_query;
use crate::http::request::{
    clone_headers, read_body, target_url, OutboundBody, OutboundRequest, ProxyContext,
};
use crate::http::response::relay;

/// Relays inbound requests to the single configured upstream.
pub struct ForwardingEngine {
    target: String,
    clients: Arc<ClientFactory>,
    max_body_bytes: usize,
}

impl ForwardingEngine {
    pub fn new(
        target: impl Into<String>,
        clients: Arc<ClientFactory>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            target: target.into(),
            clients,
            max_body_bytes,
        }
    }

    /// Forward `request` to the same path and query on the target.
    pub async fn passthrough(
        &self,
        ctx: &ProxyContext,
        request: Request<Body>,
    ) -> GatewayResult<Response> {
        let client = self.clients.new_client().await?;

        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let body = if parts.method == Method::POST {
            let bytes = read_body(body, self.max_body_bytes).await?;
            tracing::debug!(body = %String::from_utf8_lossy(&bytes), "Request body");
            OutboundBody::Buffered(bytes)
        } else {
            OutboundBody::stream(body)
        };

        let mut headers = clone_headers(&parts.headers, false);
        ctx.annotate(&mut headers);

        let url = target_url(&self.target, path_and_query);
        let outbound = OutboundRequest::new(parts.method.clone(), url)
            .headers(headers)
            .body(body);

        let mut guard = ForwardGuard::new(&outbound);
        let upstream = client.execute(outbound).await?;
        guard.finish();
        Ok(relay(upstream))
    }

    /// Forward `{"targetParams": {...}}` as a GET with those parameters as the query.
    pub async fn forward_query(
        &self,
        ctx: &ProxyContext,
        inbound: &axum::http::HeaderMap,
        body: Bytes,
    ) -> GatewayResult<Response> {
        let query = body_to_query(&body)?;
        let client = self.clients.new_client().await?;

        let mut headers = clone_headers(inbound, true);
        ctx.annotate(&mut headers);

        let url = target_url(&self.target, &format!("/?{}", query));
        let outbound = OutboundRequest::new(Method::GET, url).headers(headers);

        let mut guard = ForwardGuard::new(&outbound);
        let upstream = client.execute(outbound).await?;
        guard.finish();
        Ok(relay(upstream))
    }
}

/// Logs forwards that are dropped before the upstream answers.
struct ForwardGuard {
    method: Method,
    url: String,
    done: bool,
}

impl ForwardGuard {
    fn new(request: &OutboundRequest) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        if !self.done && !std::thread::panicking() {
            tracing::info!(
                method = %self.method,
                url = %self.url,
                "Forward cancelled or failed before upstream response"
            );
        }
    }
}
