//! Upstream client construction.
//!
//! # Responsibilities
//! - Own the process-wide connection pools (plain and authenticated)
//! - Resolve the token provider once, on first authenticated use
//! - Hand out per-request [`UpstreamClient`] values that attach tokens
//!
//! # Design Decisions
//! - The plain client carries a fixed timeout; the authenticated one has none
//! - A failed provider resolution is reported per request and retried on the next
//! - Clients are cheap handles over shared pools, never per-request connections

use axum::http::{header, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::auth::{
    credentials, CachingProvider, LazyAmbientProvider, SelfSignedProvider, TokenProvider,
};
use crate::config::{AuthConfig, TokenStrategy, UpstreamConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::http::request::OutboundRequest;

/// Builds upstream clients for the configured target.
pub struct ClientFactory {
    upstream: UpstreamConfig,
    auth: AuthConfig,
    plain: reqwest::Client,
    authenticated: reqwest::Client,
    ambient: Arc<LazyAmbientProvider>,
    provider: OnceCell<Arc<dyn TokenProvider>>,
}

impl ClientFactory {
    pub fn new(upstream: UpstreamConfig, auth: AuthConfig) -> GatewayResult<Self> {
        let plain = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream.plain_timeout_secs))
            .build()
            .map_err(|e| GatewayError::AuthClientConstruction(e.to_string()))?;
        let authenticated = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::AuthClientConstruction(e.to_string()))?;
        let ambient = Arc::new(LazyAmbientProvider::new(auth.clone(), authenticated.clone()));

        Ok(Self {
            upstream,
            auth,
            plain,
            authenticated,
            ambient,
            provider: OnceCell::new(),
        })
    }

    /// Use `provider` instead of resolving one from configuration.
    pub fn with_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.provider = OnceCell::new_with(Some(provider));
        self
    }

    /// The ambient credential, shared with other Google API callers.
    pub fn ambient(&self) -> Arc<LazyAmbientProvider> {
        self.ambient.clone()
    }

    /// A client for the configured target: authenticated when
    /// `use_google_jwt` is set, otherwise plain and timeout-bound.
    pub async fn new_client(&self) -> GatewayResult<UpstreamClient> {
        if !self.upstream.use_google_jwt {
            return Ok(UpstreamClient::Plain {
                http: self.plain.clone(),
                timeout: Duration::from_secs(self.upstream.plain_timeout_secs),
            });
        }

        Ok(UpstreamClient::Authenticated {
            http: self.authenticated.clone(),
            provider: self.token_provider().await?,
            audience: self.upstream.target_url.clone(),
        })
    }

    /// The configured token provider, resolved on first call.
    pub async fn token_provider(&self) -> GatewayResult<Arc<dyn TokenProvider>> {
        self.provider
            .get_or_try_init(|| self.resolve_provider())
            .await
            .cloned()
            .map_err(|e| GatewayError::AuthClientConstruction(e.to_string()))
    }

    async fn resolve_provider(&self) -> GatewayResult<Arc<dyn TokenProvider>> {
        let provider: Arc<dyn TokenProvider> = match self.auth.strategy {
            TokenStrategy::Ambient => {
                let source = self.ambient.get().await?;
                tracing::info!(source = source.source_kind(), "Resolved ambient credentials");
                self.ambient.clone()
            }
            TokenStrategy::SelfSigned => {
                let env = |key: &str| std::env::var(key).ok();
                let account = credentials::load_service_account(&self.auth, &env)?;
                tracing::info!(client_email = %account.client_email, "Using self-signed tokens");
                Arc::new(SelfSignedProvider::new(
                    self.authenticated.clone(),
                    account,
                    self.auth.token_endpoint.clone(),
                    self.auth.on_mint_failure,
                ))
            }
        };

        if self.auth.cache_tokens {
            Ok(Arc::new(CachingProvider::new(
                provider,
                Duration::from_secs(self.auth.refresh_margin_secs),
            )))
        } else {
            Ok(provider)
        }
    }
}

/// A client for one upstream call.
#[derive(Clone)]
pub enum UpstreamClient {
    Authenticated {
        http: reqwest::Client,
        provider: Arc<dyn TokenProvider>,
        audience: String,
    },
    Plain {
        http: reqwest::Client,
        timeout: Duration,
    },
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticated { provider, audience, .. } => f
                .debug_struct("Authenticated")
                .field("strategy", &provider.strategy())
                .field("audience", audience)
                .finish(),
            Self::Plain { timeout, .. } => {
                f.debug_struct("Plain").field("timeout", timeout).finish()
            }
        }
    }
}

impl UpstreamClient {
    /// Request timeout enforced by this client, if any.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Plain { timeout, .. } => Some(*timeout),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Issue the request, attaching an identity token when authenticated.
    pub async fn execute(&self, request: OutboundRequest) -> GatewayResult<reqwest::Response> {
        let OutboundRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        let http = match self {
            Self::Authenticated {
                http,
                provider,
                audience,
            } => {
                let token = provider.mint(audience).await?;
                if !token.is_empty() {
                    let value = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
                        .map_err(|e| {
                            let reason = format!("token is not a header value: {}", e);
                            GatewayError::TokenExchange(reason)
                        })?;
                    headers.insert(header::AUTHORIZATION, value);
                }
                http
            }
            Self::Plain { http, .. } => http,
        };

        let mut builder = http.request(method, &url).headers(headers);
        if let Some(body) = body.into_reqwest() {
            builder = builder.body(body);
        }
        builder
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))
    }
}
