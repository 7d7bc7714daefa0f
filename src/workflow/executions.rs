//! Workflow Executions REST client.

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::{AccessTokenSource, CLOUD_PLATFORM_SCOPE};
use crate::error::{GatewayError, GatewayResult};
use crate::workflow::{Execution, ExecutionHandle, WorkflowExecutor};

/// Creates executions via `POST {endpoint}/{workflow}/executions`.
pub struct HttpWorkflowExecutor {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl HttpWorkflowExecutor {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl WorkflowExecutor for HttpWorkflowExecutor {
    async fn create_execution(
        &self,
        workflow_id: &str,
        execution: Execution,
    ) -> GatewayResult<ExecutionHandle> {
        let token = self
            .tokens
            .access_token(CLOUD_PLATFORM_SCOPE)
            .await
            .map_err(|e| GatewayError::WorkflowDispatch(format!("no access token: {}", e)))?;

        let url = format!("{}/{}/executions", self.endpoint, workflow_id.trim_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(token.secret())
            .json(&execution)
            .send()
            .await
            .map_err(|e| {
                GatewayError::WorkflowDispatch(format!("executions API unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::WorkflowDispatch(format!(
                "executions API returned HTTP {}: {}",
                status, body
            )));
        }

        response
            .json::<ExecutionHandle>()
            .await
            .map_err(|e| {
                GatewayError::WorkflowDispatch(format!("invalid execution response: {}", e))
            })
    }
}
