//! Gateway error taxonomy and its HTTP rendering.
//!
//! # Design Decisions
//! - One error type for every request-path failure
//! - Construction-time failures (credentials, client setup) map to 500
//! - Malformed bodies map to 400 so a bad caller never takes down the handler
//! - Upstream transport and workflow failures map to 502

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while authenticating or forwarding a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No ambient credential could be resolved.
    #[error("credential discovery failed: {0}")]
    CredentialDiscovery(String),

    /// The authenticated upstream client could not be built.
    #[error("failed to construct authenticated client: {0}")]
    AuthClientConstruction(String),

    /// Private key matched neither supported encoding.
    #[error("unparseable private key: {0}")]
    KeyParse(String),

    /// Signing, transport or response parsing failed during a token mint.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The upstream target could not be reached.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The inbound request body did not have the expected shape.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The workflow execution service rejected or failed the dispatch.
    #[error("workflow dispatch failed: {0}")]
    WorkflowDispatch(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status returned to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnreachable(_) | Self::WorkflowDispatch(_) => StatusCode::BAD_GATEWAY,
            Self::CredentialDiscovery(_)
            | Self::AuthClientConstruction(_)
            | Self::KeyParse(_)
            | Self::TokenExchange(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialDiscovery(_) => "credential_discovery",
            Self::AuthClientConstruction(_) => "auth_client_construction",
            Self::KeyParse(_) => "key_parse",
            Self::TokenExchange(_) => "token_exchange",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::MalformedRequest(_) => "malformed_request",
            Self::WorkflowDispatch(_) => "workflow_dispatch",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
