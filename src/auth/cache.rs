//! Per-audience token cache.
//!
//! # Design Decisions
//! - One async mutex per audience: concurrent callers for the same audience
//!   wait on a single in-flight mint, other audiences are unaffected
//! - Tokens are reused until `refresh_margin` before expiry
//! - Empty (fail-open) tokens are never stored

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::{unix_now, BearerToken, TokenProvider};
use crate::error::GatewayResult;

type Slot = Arc<Mutex<Option<BearerToken>>>;

/// Wraps a provider with a single-flight cache keyed by audience.
pub struct CachingProvider {
    inner: Arc<dyn TokenProvider>,
    entries: DashMap<String, Slot>,
    refresh_margin: Duration,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn TokenProvider>, refresh_margin: Duration) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            refresh_margin,
        }
    }

    fn slot(&self, audience: &str) -> Slot {
        // Clone out of the map so no shard lock is held across an await.
        self.entries.entry(audience.to_string()).or_default().clone()
    }
}

#[async_trait]
impl TokenProvider for CachingProvider {
    async fn mint(&self, audience: &str) -> GatewayResult<BearerToken> {
        let slot = self.slot(audience);
        let mut cached = slot.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh_at(unix_now(), self.refresh_margin.as_secs()) {
                return Ok(token.clone());
            }
        }

        let token = self.inner.mint(audience).await?;
        if token.is_empty() {
            *cached = None;
        } else {
            tracing::debug!(
                audience = %audience,
                strategy = self.inner.strategy(),
                expires_at = token.expires_at(),
                "Cached identity token"
            );
            *cached = Some(token.clone());
        }
        Ok(token)
    }

    fn strategy(&self) -> &'static str {
        self.inner.strategy()
    }
}
