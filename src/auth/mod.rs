//! Identity token subsystem.
//!
//! # Data Flow
//! ```text
//! ClientFactory (authenticated client)
//!     → CachingProvider (per-audience single-flight cache)
//!     → AmbientProvider ─┬─ service-account file → JWT-bearer exchange
//!                        └─ metadata server      → identity endpoint
//!     or SelfSignedProvider → key.rs (parse, claims, sign) → JWT-bearer exchange
//!     → BearerToken
//! ```
//!
//! # Design Decisions
//! - One capability (`TokenProvider::mint`) behind every strategy
//! - Discovery happens once per provider, minting happens per call
//! - Self-signed failures follow an explicit fail-closed / fail-open policy

pub mod ambient;
pub mod cache;
pub mod credentials;
pub mod key;
pub mod self_signed;

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::GatewayResult;

pub use ambient::{AmbientProvider, LazyAmbientProvider};
pub use cache::CachingProvider;
pub use credentials::{CredentialSource, ServiceAccountKey};
pub use self_signed::SelfSignedProvider;

/// Scope requested for Google API access tokens.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Tokens without an `exp` claim or `expires_in` are assumed to live this long.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// An opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
    /// Expiry as seconds since the Unix epoch.
    expires_at: u64,
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("empty", &self.value.is_empty())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl BearerToken {
    pub fn new(value: impl Into<String>, expires_at: u64) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// A token just issued by a token endpoint.
    ///
    /// Expiry comes from the token's own `exp` claim, then `expires_in`,
    /// then the default lifetime.
    pub fn issued(value: impl Into<String>, expires_in: Option<u64>) -> Self {
        let value = value.into();
        let lifetime = expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let expires_at =
            key::token_expiry(&value).unwrap_or_else(|| unix_now().saturating_add(lifetime));
        Self { value, expires_at }
    }

    /// The placeholder forwarded under the fail-open policy.
    pub fn empty() -> Self {
        Self {
            value: String::new(),
            expires_at: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// True while more than `margin_secs` of validity remain at `now`.
    pub fn is_fresh_at(&self, now: u64, margin_secs: u64) -> bool {
        !self.is_empty() && self.expires_at > now.saturating_add(margin_secs)
    }
}

/// Mints identity tokens scoped to an audience.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn mint(&self, audience: &str) -> GatewayResult<BearerToken>;

    /// Label for logs and metrics.
    fn strategy(&self) -> &'static str;
}

/// Mints OAuth access tokens for Google APIs.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, scope: &str) -> GatewayResult<BearerToken>;
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
