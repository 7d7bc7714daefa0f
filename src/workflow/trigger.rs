//! Workflow dispatch with trace-context injection.

use serde_json::Value;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::workflow::{Execution, ExecutionHandle, WorkflowExecutor, TRACE_CONTEXT_FIELD};

/// Validate `input` as a JSON object and set its `tracecontext` field.
///
/// Without a trace value the input is returned unchanged.
pub fn inject_trace_context(input: &str, trace: Option<&str>) -> GatewayResult<String> {
    let mut document: Value = serde_json::from_str(input)
        .map_err(|e| GatewayError::MalformedRequest(format!("workflow input is not JSON: {}", e)))?;
    let object = document
        .as_object_mut()
        .ok_or_else(|| {
            GatewayError::MalformedRequest("workflow input is not a JSON object".into())
        })?;

    let Some(trace) = trace else {
        return Ok(input.to_string());
    };
    object.insert(TRACE_CONTEXT_FIELD.to_string(), Value::String(trace.to_string()));

    serde_json::to_string(&document)
        .map_err(|e| {
            GatewayError::MalformedRequest(format!("cannot serialize workflow input: {}", e))
        })
}

/// Start `workflow_id` with `input` as its argument.
pub async fn exec_workflow(
    executor: &dyn WorkflowExecutor,
    workflow_id: &str,
    input: &str,
    trace: Option<&str>,
) -> GatewayResult<ExecutionHandle> {
    let argument = inject_trace_context(input, trace)?;
    let execution = Execution {
        name: workflow_id.to_string(),
        argument,
    };
    executor.create_execution(workflow_id, execution).await
}

/// The configured workflow and the executor that runs it.
pub struct WorkflowTrigger {
    workflow_id: Option<String>,
    executor: Arc<dyn WorkflowExecutor>,
}

impl WorkflowTrigger {
    pub fn new(workflow_id: Option<String>, executor: Arc<dyn WorkflowExecutor>) -> Self {
        Self {
            workflow_id,
            executor,
        }
    }

    pub async fn dispatch(
        &self,
        input: &str,
        trace: Option<&str>,
    ) -> GatewayResult<ExecutionHandle> {
        let workflow_id = self
            .workflow_id
            .as_deref()
            .ok_or_else(|| GatewayError::WorkflowDispatch("no workflow_id configured".into()))?;

        tracing::debug!(workflow_id = %workflow_id, input = %input, "Dispatching workflow");
        let result = exec_workflow(self.executor.as_ref(), workflow_id, input, trace).await;
        match &result {
            Ok(handle) => {
                metrics::record_workflow_dispatch("ok");
                tracing::info!(
                    workflow_id = %workflow_id,
                    execution = %handle.name,
                    "Workflow started"
                );
            }
            Err(e) => {
                metrics::record_workflow_dispatch("error");
                tracing::warn!(workflow_id = %workflow_id, error = %e, "Workflow dispatch failed");
            }
        }
        result
    }
}
