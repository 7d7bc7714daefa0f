//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Token endpoint used for the JWT-bearer exchange.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream target and how to reach it.
    pub upstream: UpstreamConfig,

    /// Identity token acquisition.
    pub auth: AuthConfig,

    /// Workflow trigger settings.
    pub workflow: WorkflowConfig,

    /// CORS policy.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Overall inbound request timeout in seconds (0 disables it).
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 0,
        }
    }
}

/// Upstream target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Root URL of the upstream (e.g., "https://target.example.run.app").
    pub target_url: String,

    /// Attach an identity token to every outbound call.
    pub use_google_jwt: bool,

    /// Timeout for the plain (unauthenticated) client.
    pub plain_timeout_secs: u64,

    /// Maximum body size buffered for POST passthrough.
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            use_google_jwt: false,
            plain_timeout_secs: 10,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// How identity tokens are minted when `use_google_jwt` is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenStrategy {
    /// Platform credential discovery (service-account file or metadata server).
    #[default]
    Ambient,
    /// Always sign a claim set with the service-account key and exchange it.
    SelfSigned,
}

/// What a self-signed mint failure does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MintFailurePolicy {
    /// Fail the request with a 5xx.
    #[default]
    FailClosed,
    /// Forward without an Authorization header and let the upstream decide.
    FailOpen,
}

/// Identity token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub strategy: TokenStrategy,

    /// Explicit service-account JSON file; takes precedence over discovery.
    pub credentials_file: Option<PathBuf>,

    /// OAuth token endpoint for the JWT-bearer grant.
    pub token_endpoint: String,

    /// Metadata server host (scheme optional, defaults to http).
    pub metadata_host: String,

    pub on_mint_failure: MintFailurePolicy,

    /// Reuse minted tokens until they approach expiry.
    pub cache_tokens: bool,

    /// Refresh a cached token this many seconds before it expires.
    pub refresh_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: TokenStrategy::Ambient,
            credentials_file: None,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            metadata_host: "metadata.google.internal".to_string(),
            on_mint_failure: MintFailurePolicy::FailClosed,
            cache_tokens: true,
            refresh_margin_secs: 300,
        }
    }
}

/// Workflow trigger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Fully-qualified workflow resource name
    /// (`projects/{project}/locations/{location}/workflows/{name}`).
    pub workflow_id: Option<String>,

    /// Base URL of the workflow executions API.
    pub executions_endpoint: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            workflow_id: None,
            executions_endpoint: "https://workflowexecutions.googleapis.com/v1".to_string(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origin; CORS headers are only emitted when set.
    pub target: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
