//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router for the passthrough, `/forward` and `/flow` routes
//! - Wire up middleware (request ID, tracing, panic recovery, CORS, timeout)
//! - Serve until the shutdown coordinator fires
//!
//! # Routes
//! - `GET|POST|DELETE /` and `/{*path}`: passthrough to the target
//! - `POST /forward`: `{"targetParams": {...}}` forwarded as a GET query
//! - `POST /flow`: raw JSON body dispatched as a workflow argument

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::http::client::ClientFactory;
use crate::http::forward::ForwardingEngine;
use crate::http::request::{read_body, ProxyContext};
use crate::http::response;
use crate::observability::metrics;
use crate::workflow::{HttpWorkflowExecutor, WorkflowExecutor, WorkflowTrigger};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ForwardingEngine>,
    pub workflows: Arc<WorkflowTrigger>,
    /// Limit for bodies read whole by `/forward` and `/flow`.
    pub max_body_bytes: usize,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    /// Create the server with the production client factory and workflow executor.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let clients = Arc::new(ClientFactory::new(config.upstream.clone(), config.auth.clone())?);
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::AuthClientConstruction(e.to_string()))?;
        let executor = Arc::new(HttpWorkflowExecutor::new(
            http,
            config.workflow.executions_endpoint.clone(),
            clients.ambient(),
        ));
        Ok(Self::from_parts(config, clients, executor))
    }

    /// Create the server around caller-supplied collaborators.
    pub fn from_parts(
        config: GatewayConfig,
        clients: Arc<ClientFactory>,
        executor: Arc<dyn WorkflowExecutor>,
    ) -> Self {
        let engine = ForwardingEngine::new(
            config.upstream.target_url.clone(),
            clients,
            config.upstream.max_body_bytes,
        );
        let state = AppState {
            engine: Arc::new(engine),
            workflows: Arc::new(WorkflowTrigger::new(
                config.workflow.workflow_id.clone(),
                executor,
            )),
            max_body_bytes: config.upstream.max_body_bytes,
        };

        let router = build_router(&config, state);
        Self {
            router,
            config: Arc::new(config),
        }
    }

    /// The router with all middleware applied.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target = %self.config.upstream.target_url,
            use_google_jwt = self.config.upstream.use_google_jwt,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn passthrough_routes() -> MethodRouter<AppState> {
    get(passthrough_handler)
        .post(passthrough_handler)
        .delete(passthrough_handler)
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/flow",
            post(flow_handler).get(passthrough_handler).delete(passthrough_handler),
        )
        .route(
            "/forward",
            post(forward_handler).get(passthrough_handler).delete(passthrough_handler),
        )
        .route("/", passthrough_routes())
        .route("/{*path}", passthrough_routes())
        .with_state(state);

    if config.listener.request_timeout_secs > 0 {
        router = router.layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            Duration::from_secs(config.listener.request_timeout_secs),
        ));
    }

    if let Some(origin) = &config.cors.target {
        match HeaderValue::from_str(origin) {
            Ok(origin) => {
                router = router.layer(
                    CorsLayer::new()
                        .allow_origin(AllowOrigin::exact(origin))
                        .allow_methods([Method::GET, Method::POST, Method::DELETE])
                        .allow_headers(cors::Any),
                );
            }
            Err(_) => tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"),
        }
    }

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO)))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"message": "internal error"})),
    )
        .into_response()
}

/// Count the response and time it until its body is fully sent or dropped.
fn finish(route: &'static str, start: Instant, result: GatewayResult<Response>) -> Response {
    let response = result.unwrap_or_else(IntoResponse::into_response);
    metrics::record_request(route, response.status().as_u16());

    let timer = metrics::LatencyTimer::new(route, start);
    if response.body().size_hint().exact().is_some() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = body.into_data_stream().map(move |chunk| {
        let _alive = &timer;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(body))
}

async fn passthrough_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let ctx = ProxyContext::new(addr, request.headers());
    finish("passthrough", start, state.engine.passthrough(&ctx, request).await)
}

async fn forward_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let start = Instant::now();
    let ctx = ProxyContext::new(addr, &headers);
    let result = match read_body(body, state.max_body_bytes).await {
        Ok(body) => state.engine.forward_query(&ctx, &headers, body).await,
        Err(e) => Err(e),
    };
    finish("forward", start, result)
}

async fn flow_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let start = Instant::now();
    let ctx = ProxyContext::new(addr, &headers);
    finish("flow", start, dispatch_flow(&state, &ctx, body).await)
}

async fn dispatch_flow(
    state: &AppState,
    ctx: &ProxyContext,
    body: Body,
) -> GatewayResult<Response> {
    let body = read_body(body, state.max_body_bytes).await?;
    let input = std::str::from_utf8(&body)
        .map_err(|e| GatewayError::MalformedRequest(format!("body is not UTF-8: {}", e)))?;
    state.workflows.dispatch(input, ctx.trace_value()).await?;
    Ok(response::text(StatusCode::OK, "success"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::workflow::{Execution, ExecutionHandle};
    use async_trait::async_trait;
    use crate::observability::metrics::tests::latency_samples;
    use axum::extract::connect_info::MockConnectInfo;
    use bytes::Bytes;
    use futures_util::FutureExt;
    use metrics_util::debugging::DebuggingRecorder;
    use tower::ServiceExt;

    struct NoopExecutor;

    #[async_trait]
    impl WorkflowExecutor for NoopExecutor {
        async fn create_execution(
            &self,
            workflow_id: &str,
            _execution: Execution,
        ) -> GatewayResult<ExecutionHandle> {
            Ok(ExecutionHandle {
                name: format!("{}/executions/1", workflow_id),
                state: None,
            })
        }
    }

    fn app(config: GatewayConfig) -> Router {
        let clients =
            ClientFactory::new(config.upstream.clone(), AuthConfig::default()).unwrap();
        GatewayServer::from_parts(config, Arc::new(clients), Arc::new(NoopExecutor))
            .router()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
    }

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.upstream.target_url = "http://127.0.0.1:9".into();
        config.workflow.workflow_id = Some("projects/p/locations/l/workflows/w".into());
        config
    }

    #[tokio::test]
    async fn test_flow_returns_success() {
        let response = app(config())
            .oneshot(Request::post("/flow").body(Body::from("{\"a\":1}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"success");
    }

    #[tokio::test]
    async fn test_flow_rejects_malformed_json() {
        let response = app(config())
            .oneshot(Request::post("/flow").body(Body::from("[1,2]")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forward_rejects_missing_target_params() {
        let response = app(config())
            .oneshot(Request::post("/forward").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["message"].as_str().unwrap().contains("targetParams"));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_bad_gateway() {
        let response = app(config())
            .oneshot(Request::get("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_flow_body_over_limit_is_json_error() {
        let mut config = config();
        config.upstream.max_body_bytes = 16;
        let response = app(config)
            .oneshot(
                Request::post("/flow")
                    .body(Body::from(format!("{{\"pad\":\"{}\"}}", "x".repeat(64))))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["message"].as_str().unwrap().contains("body"));
    }

    #[test]
    fn test_streamed_response_timed_until_body_ends() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        ::metrics::with_local_recorder(&recorder, || {
            let chunks = futures_util::stream::iter([
                Ok::<_, std::io::Error>(Bytes::from_static(b"first,")),
                Ok(Bytes::from_static(b"second")),
            ]);
            let upstream = Response::new(Body::from_stream(chunks));
            let response = finish("passthrough", Instant::now(), Ok(upstream));
            assert_eq!(latency_samples(&snapshotter), 0);

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .now_or_never()
                .unwrap()
                .unwrap();
            assert_eq!(&body[..], b"first,second");
        });
        assert_eq!(latency_samples(&snapshotter), 1);
    }

    #[test]
    fn test_sized_response_timed_immediately() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        let sized = ::metrics::with_local_recorder(&recorder, || {
            finish("flow", Instant::now(), Ok(response::text(StatusCode::OK, "success")))
        });
        assert_eq!(latency_samples(&snapshotter), 1);
        assert_eq!(sized.body().size_hint().exact(), Some(7));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let response = app(config())
            .oneshot(Request::put("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_preflight_for_configured_origin() {
        let mut config = config();
        config.cors.target = Some("https://app.example.com".into());
        let response = app(config)
            .oneshot(
                Request::options("/anything")
                    .header("origin", "https://app.example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://app.example.com"
        );
    }
}
