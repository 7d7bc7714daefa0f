//! Workflow trigger subsystem.
//!
//! # Data Flow
//! ```text
//! POST /flow (raw JSON body, trace headers)
//!     → trigger.rs   (validate object, inject `tracecontext`)
//!     → WorkflowExecutor::create_execution
//!         → executions.rs (Workflow Executions REST API, ambient access token)
//!     → ExecutionHandle
//! ```
//!
//! # Design Decisions
//! - The executor is a trait so the trigger can run against any backend
//! - No idempotency key is attached; a retried caller dispatches twice

pub mod executions;
pub mod trigger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

pub use executions::HttpWorkflowExecutor;
pub use trigger::{exec_workflow, inject_trace_context, WorkflowTrigger};

/// Field the inbound trace value is written to.
pub const TRACE_CONTEXT_FIELD: &str = "tracecontext";

/// A workflow execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    /// Equal to the workflow identifier.
    #[serde(skip)]
    pub name: String,
    /// Serialized JSON argument.
    pub argument: String,
}

/// Handle of a created execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionHandle {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Creates workflow executions.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn create_execution(
        &self,
        workflow_id: &str,
        execution: Execution,
    ) -> GatewayResult<ExecutionHandle>;
}
