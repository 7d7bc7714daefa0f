//! Ambient credential discovery.
//!
//! # Responsibilities
//! - Load service-account key files
//! - Resolve the credential source from configuration and environment
//! - Fall back to the metadata server when no key file exists
//!
//! Discovery order:
//! 1. `auth.credentials_file`
//! 2. `GOOGLE_APPLICATION_CREDENTIALS`
//! 3. `$HOME/.config/gcloud/application_default_credentials.json`
//! 4. metadata server (`GCE_METADATA_HOST` or `auth.metadata_host`)

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::ambient::MetadataServer;
use crate::config::AuthConfig;
use crate::error::{GatewayError, GatewayResult};

/// Environment variable pointing at a credentials file.
pub const CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV_VAR: &str = "GCE_METADATA_HOST";

const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// The fields of a service-account JSON key the gateway uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parse a credentials document; only `service_account` keys can sign.
    pub fn from_json(bytes: &[u8]) -> GatewayResult<Self> {
        let key: Self = serde_json::from_slice(bytes)
            .map_err(|e| {
                GatewayError::CredentialDiscovery(format!("invalid credentials JSON: {}", e))
            })?;

        if key.kind != SERVICE_ACCOUNT_TYPE {
            return Err(GatewayError::CredentialDiscovery(format!(
                "credentials of type '{}' cannot mint identity tokens",
                key.kind
            )));
        }
        Ok(key)
    }

    pub fn from_file(path: &Path) -> GatewayResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            GatewayError::CredentialDiscovery(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&bytes)
    }
}

/// Where ambient identity comes from.
#[derive(Debug)]
pub enum CredentialSource {
    ServiceAccount(ServiceAccountKey),
    MetadataServer(MetadataServer),
}

impl CredentialSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "service_account",
            Self::MetadataServer(_) => "metadata_server",
        }
    }
}

/// Find a service-account key file without touching the network.
pub fn find_key_file<F>(config: &AuthConfig, lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = &config.credentials_file {
        return Some(path.clone());
    }
    if let Some(path) = lookup(CREDENTIALS_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    lookup("HOME")
        .map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("gcloud")
                .join("application_default_credentials.json")
        })
        .filter(|path| path.is_file())
}

/// Load the service-account key used by the self-signed strategy.
pub fn load_service_account<F>(config: &AuthConfig, lookup: &F) -> GatewayResult<ServiceAccountKey>
where
    F: Fn(&str) -> Option<String>,
{
    let path = find_key_file(config, lookup).ok_or_else(|| {
        GatewayError::CredentialDiscovery("no service-account key file configured".into())
    })?;
    ServiceAccountKey::from_file(&path)
}

/// Resolve the ambient credential source.
pub async fn discover<F>(
    config: &AuthConfig,
    http: &reqwest::Client,
    lookup: F,
) -> GatewayResult<CredentialSource>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = find_key_file(config, &lookup) {
        let key = ServiceAccountKey::from_file(&path)?;
        tracing::info!(
            path = %path.display(),
            client_email = %key.client_email,
            "Using service-account credentials"
        );
        return Ok(CredentialSource::ServiceAccount(key));
    }

    let host = lookup(METADATA_HOST_ENV_VAR)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| config.metadata_host.clone());
    let metadata = MetadataServer::new(&host, http.clone());
    if metadata.is_available().await {
        tracing::info!(host = %host, "Using metadata server credentials");
        return Ok(CredentialSource::MetadataServer(metadata));
    }

    Err(GatewayError::CredentialDiscovery(
        "no service-account key file and no metadata server reachable".into(),
    ))
}
