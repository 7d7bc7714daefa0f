//! Self-signed JWT exchange.
//!
//! # Responsibilities
//! - Build and sign a claim set with the service-account key
//! - Exchange it at the OAuth token endpoint (JWT-bearer grant)
//! - Apply the configured mint-failure policy
//!
//! # Design Decisions
//! - The key is re-parsed on each mint; nothing derived from it is kept
//! - `request_identity`/`request_access` always report failures;
//!   only `TokenProvider::mint` consults the policy

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::credentials::ServiceAccountKey;
use crate::auth::key::{ClaimSet, PrivateKey};
use crate::auth::{unix_now, AccessTokenSource, BearerToken, TokenProvider};
use crate::config::MintFailurePolicy;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

/// Grant type of the assertion exchange.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Mints tokens by signing claim sets with a service-account key.
#[derive(Debug, Clone)]
pub struct SelfSignedProvider {
    http: reqwest::Client,
    account: ServiceAccountKey,
    token_endpoint: String,
    policy: MintFailurePolicy,
}

impl SelfSignedProvider {
    pub fn new(
        http: reqwest::Client,
        account: ServiceAccountKey,
        token_endpoint: impl Into<String>,
        policy: MintFailurePolicy,
    ) -> Self {
        Self {
            http,
            account,
            token_endpoint: token_endpoint.into(),
            policy,
        }
    }

    /// Exchange a signed identity claim set for an `id_token`.
    pub async fn request_identity(&self, audience: &str) -> GatewayResult<BearerToken> {
        let claims = ClaimSet::identity(
            &self.account.client_email,
            &self.token_endpoint,
            audience,
            unix_now(),
        );
        let response = self.exchange(&claims).await?;
        let token = response
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::TokenExchange("response has no id_token".into()))?;
        Ok(BearerToken::issued(token, response.expires_in))
    }

    /// Exchange a signed scoped claim set for an `access_token`.
    pub async fn request_access(&self, scope: &str) -> GatewayResult<BearerToken> {
        let claims = ClaimSet::access(
            &self.account.client_email,
            &self.token_endpoint,
            scope,
            unix_now(),
        );
        let response = self.exchange(&claims).await?;
        let token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::TokenExchange("response has no access_token".into()))?;
        Ok(BearerToken::issued(token, response.expires_in))
    }

    async fn exchange(&self, claims: &ClaimSet) -> GatewayResult<TokenResponse> {
        let key = PrivateKey::parse(self.account.private_key.as_bytes())?;
        let assertion = claims.sign(&key, self.account.private_key_id.as_deref())?;

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| {
                GatewayError::TokenExchange(format!("token endpoint unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TokenExchange(format!(
                "token endpoint returned HTTP {}: {}",
                status, body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| GatewayError::TokenExchange(format!("invalid token response: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for SelfSignedProvider {
    async fn mint(&self, audience: &str) -> GatewayResult<BearerToken> {
        match self.request_identity(audience).await {
            Ok(token) => {
                metrics::record_token_mint(self.strategy(), "ok");
                Ok(token)
            }
            Err(e) if self.policy == MintFailurePolicy::FailOpen => {
                tracing::warn!(
                    audience = %audience,
                    error = %e,
                    "Token mint failed, forwarding without credentials"
                );
                metrics::record_token_mint(self.strategy(), "degraded");
                Ok(BearerToken::empty())
            }
            Err(e) => {
                metrics::record_token_mint(self.strategy(), "error");
                Err(e)
            }
        }
    }

    fn strategy(&self) -> &'static str {
        "self_signed"
    }
}

#[async_trait]
impl AccessTokenSource for SelfSignedProvider {
    async fn access_token(&self, scope: &str) -> GatewayResult<BearerToken> {
        self.request_access(scope).await
    }
}
