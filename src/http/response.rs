//! Upstream response relay.
//!
//! # Design Decisions
//! - Status code and `Content-Type` are copied verbatim; other upstream
//!   headers are not relayed
//! - The body is streamed, never buffered whole

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};

/// Turn an upstream response into the caller's response.
pub fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
}

/// Plain-text response used by the workflow route.
pub fn text(status: StatusCode, body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_relay_copies_status_content_type_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(418)
                    .set_body_raw("short and stout", "application/x-teapot")
                    .insert_header("x-upstream-only", "1"),
            )
            .mount(&server)
            .await;

        let upstream = reqwest::get(server.uri()).await.unwrap();
        let response = relay(upstream);

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-teapot");
        assert!(response.headers().get("x-upstream-only").is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"short and stout");
    }
}
