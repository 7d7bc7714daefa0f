//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use identity_gateway::auth::{AccessTokenSource, BearerToken, TokenProvider};
use identity_gateway::config::GatewayConfig;
use identity_gateway::http::{ClientFactory, GatewayServer};
use identity_gateway::workflow::WorkflowExecutor;
use identity_gateway::{GatewayResult, Shutdown};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// A gateway serving on an ephemeral port; stops when dropped.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults pointed at `target`, with a plain client.
pub fn test_config(target: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.target_url = target.to_string();
    config
}

/// Serve `server` on 127.0.0.1 with an OS-assigned port.
pub async fn serve(server: GatewayServer) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    TestGateway { addr, shutdown }
}

/// Start the production wiring for `config`.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    serve(GatewayServer::new(config).unwrap()).await
}

/// Start a gateway with injected collaborators.
pub async fn start_gateway_with(
    config: GatewayConfig,
    provider: Option<Arc<dyn TokenProvider>>,
    executor: Arc<dyn WorkflowExecutor>,
) -> TestGateway {
    let mut clients = ClientFactory::new(config.upstream.clone(), config.auth.clone()).unwrap();
    if let Some(provider) = provider {
        clients = clients.with_provider(provider);
    }
    serve(GatewayServer::from_parts(config, Arc::new(clients), executor)).await
}

/// HTTP client for calling the gateway.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Always returns the same identity token.
pub struct StaticTokenProvider(pub &'static str);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn mint(&self, _audience: &str) -> GatewayResult<BearerToken> {
        Ok(BearerToken::new(self.0, u64::MAX))
    }

    fn strategy(&self) -> &'static str {
        "static"
    }
}

/// Always returns the same access token.
pub struct FixedAccessToken(pub &'static str);

#[async_trait]
impl AccessTokenSource for FixedAccessToken {
    async fn access_token(&self, _scope: &str) -> GatewayResult<BearerToken> {
        Ok(BearerToken::new(self.0, u64::MAX))
    }
}

pub fn generate_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap()
}

pub fn pkcs8_pem(key: &RsaPrivateKey) -> String {
    key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
}

pub fn pkcs1_pem(key: &RsaPrivateKey) -> String {
    key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string()
}

/// Write a service-account key file and return its path.
pub fn write_service_account(private_key: &str, token_uri: Option<&str>) -> PathBuf {
    let mut json = serde_json::json!({
        "type": "service_account",
        "client_email": "gateway@project.iam.gserviceaccount.com",
        "private_key": private_key,
        "private_key_id": "test-kid",
    });
    if let Some(uri) = token_uri {
        json["token_uri"] = serde_json::Value::String(uri.to_string());
    }
    let path = std::env::temp_dir().join(format!("sa-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, json.to_string()).unwrap();
    path
}
