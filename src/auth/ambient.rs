//! Ambient-credential token provider.
//!
//! # Responsibilities
//! - Resolve the platform credential once (see credentials.rs)
//! - Mint identity tokens through whichever source was found
//! - Mint access tokens for Google APIs from the same source

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::auth::credentials::{self, CredentialSource};
use crate::auth::self_signed::SelfSignedProvider;
use crate::auth::{AccessTokenSource, BearerToken, TokenProvider};
use crate::config::{AuthConfig, MintFailurePolicy};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

const METADATA_FLAVOR: &str = "Metadata-Flavor";
const DETECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for the compute metadata server.
#[derive(Debug, Clone)]
pub struct MetadataServer {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MetadataAccessToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl MetadataServer {
    /// `host` may be a bare host[:port] or a full base URL.
    pub fn new(host: &str, http: reqwest::Client) -> Self {
        let base_url = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self { base_url, http }
    }

    fn account_url(&self, leaf: &str) -> String {
        format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/{}",
            self.base_url, leaf
        )
    }

    /// True when a metadata server answers with the expected flavor header.
    pub async fn is_available(&self) -> bool {
        let response = self
            .http
            .get(format!("{}/computeMetadata/v1/", self.base_url))
            .header(METADATA_FLAVOR, "Google")
            .timeout(DETECT_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(r) => r
                .headers()
                .get(METADATA_FLAVOR)
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "Google")
                .unwrap_or(false),
            Err(e) => {
                tracing::debug!(
                    base_url = %self.base_url,
                    error = %e,
                    "Metadata server not reachable"
                );
                false
            }
        }
    }

    pub async fn identity_token(&self, audience: &str) -> GatewayResult<BearerToken> {
        let response = self
            .http
            .get(self.account_url("identity"))
            .query(&[("audience", audience), ("format", "full")])
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .map_err(|e| {
                GatewayError::TokenExchange(format!("metadata server unreachable: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::TokenExchange(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::TokenExchange(format!(
                "metadata identity returned HTTP {}: {}",
                status, body
            )));
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(GatewayError::TokenExchange("metadata identity token is empty".into()));
        }
        Ok(BearerToken::issued(token, None))
    }

    pub async fn access_token(&self, scope: &str) -> GatewayResult<BearerToken> {
        let response = self
            .http
            .get(self.account_url("token"))
            .query(&[("scopes", scope)])
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .map_err(|e| {
                GatewayError::TokenExchange(format!("metadata server unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::TokenExchange(format!(
                "metadata token returned HTTP {}",
                response.status()
            )));
        }

        let token: MetadataAccessToken = response
            .json()
            .await
            .map_err(|e| GatewayError::TokenExchange(format!("invalid metadata token: {}", e)))?;
        Ok(BearerToken::issued(token.access_token, token.expires_in))
    }
}

#[derive(Debug)]
enum Source {
    ServiceAccount(SelfSignedProvider),
    Metadata(MetadataServer),
}

/// Mints tokens from the discovered platform credential.
#[derive(Debug)]
pub struct AmbientProvider {
    source: Source,
}

impl AmbientProvider {
    /// Discover credentials from configuration and the process environment.
    pub async fn discover(config: &AuthConfig, http: reqwest::Client) -> GatewayResult<Self> {
        let source = credentials::discover(config, &http, |key| std::env::var(key).ok()).await?;
        Ok(Self::from_source(source, config, http))
    }

    pub fn from_source(
        source: CredentialSource,
        config: &AuthConfig,
        http: reqwest::Client,
    ) -> Self {
        let source = match source {
            CredentialSource::ServiceAccount(account) => {
                let endpoint = account
                    .token_uri
                    .clone()
                    .unwrap_or_else(|| config.token_endpoint.clone());
                // Discovery errors are never degraded on this path.
                Source::ServiceAccount(SelfSignedProvider::new(
                    http,
                    account,
                    endpoint,
                    MintFailurePolicy::FailClosed,
                ))
            }
            CredentialSource::MetadataServer(server) => Source::Metadata(server),
        };
        Self { source }
    }

    pub fn source_kind(&self) -> &'static str {
        match self.source {
            Source::ServiceAccount(_) => "service_account",
            Source::Metadata(_) => "metadata_server",
        }
    }
}

#[async_trait]
impl TokenProvider for AmbientProvider {
    async fn mint(&self, audience: &str) -> GatewayResult<BearerToken> {
        let result = match &self.source {
            Source::ServiceAccount(provider) => provider.request_identity(audience).await,
            Source::Metadata(server) => server.identity_token(audience).await,
        };
        metrics::record_token_mint(self.strategy(), if result.is_ok() { "ok" } else { "error" });
        result
    }

    fn strategy(&self) -> &'static str {
        "ambient"
    }
}

#[async_trait]
impl AccessTokenSource for AmbientProvider {
    async fn access_token(&self, scope: &str) -> GatewayResult<BearerToken> {
        match &self.source {
            Source::ServiceAccount(provider) => provider.request_access(scope).await,
            Source::Metadata(server) => server.access_token(scope).await,
        }
    }
}

/// An [`AmbientProvider`] discovered on first use.
///
/// A failed discovery is not remembered; the next call tries again.
pub struct LazyAmbientProvider {
    config: AuthConfig,
    http: reqwest::Client,
    cell: OnceCell<AmbientProvider>,
}

impl LazyAmbientProvider {
    pub fn new(config: AuthConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> GatewayResult<&AmbientProvider> {
        self.cell
            .get_or_try_init(|| AmbientProvider::discover(&self.config, self.http.clone()))
            .await
    }
}

#[async_trait]
impl TokenProvider for LazyAmbientProvider {
    async fn mint(&self, audience: &str) -> GatewayResult<BearerToken> {
        self.get().await?.mint(audience).await
    }

    fn strategy(&self) -> &'static str {
        "ambient"
    }
}

#[async_trait]
impl AccessTokenSource for LazyAmbientProvider {
    async fn access_token(&self, scope: &str) -> GatewayResult<BearerToken> {
        self.get().await?.access_token(scope).await
    }
}
