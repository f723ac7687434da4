//! The public result of a run and its assembly from the terminal state.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::ErrorType;
use crate::events::TraceEntry;
use crate::metrics::RunMetrics;
use crate::Error;

/// Details of the first failure in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub message: String,
    /// The step the dispatcher was executing; `None` when the run failed
    /// before any step started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
}

/// Facts about a run, present whatever the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub metrics: RunMetrics,
    /// Caller tags from [`RunOptions::metadata`](crate::RunOptions).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,
}

/// The terminal report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// True only if every step succeeded.
    pub success: bool,
    /// Outputs of the steps that completed, in execution order.
    pub steps: IndexMap<String, Value>,
    /// Output of the last step, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    /// The first failure, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
    pub metadata: RunMetadata,
}

impl WorkflowResult {
    /// Output of one completed step.
    pub fn output(&self, step_name: &str) -> Option<&Value> {
        self.steps.get(step_name)
    }

    /// Name of the step that failed, if any.
    pub fn failed_step(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.step_name.as_deref())
    }

    /// Result for a run that never started, e.g. because the graph was invalid.
    pub fn rejected(workflow_name: &str, error: Error, tags: Map<String, Value>) -> Self {
        let ctx = ExecutionContext::new(workflow_name, Value::Null);
        assemble(
            ctx,
            Termination::Failed {
                step_name: None,
                error,
            },
            tags,
        )
    }
}

/// How dispatch ended.
#[derive(Debug)]
pub enum Termination {
    /// Every step completed; `last_step` is the last one in execution order.
    Completed { last_step: Option<String> },
    /// Dispatch stopped at `step_name` (or before any step).
    Failed {
        step_name: Option<String>,
        error: Error,
    },
}

/// Build the public result from a run's context and terminal state.
pub fn assemble(
    ctx: ExecutionContext,
    termination: Termination,
    tags: Map<String, Value>,
) -> WorkflowResult {
    assemble_with_trace(ctx, termination, tags).0
}

/// Like [`assemble`], also handing back the run's event trace.
pub fn assemble_with_trace(
    ctx: ExecutionContext,
    termination: Termination,
    tags: Map<String, Value>,
) -> (WorkflowResult, Vec<TraceEntry>) {
    let run_id = ctx.run_id();
    let workflow_name = ctx.workflow_name().to_string();
    let started_at = ctx.started_at();
    let completed_at = Utc::now();
    let duration_ms = u64::try_from((completed_at - started_at).num_milliseconds()).unwrap_or(0);
    let (steps, metrics, traces) = ctx.into_parts();

    let metadata = RunMetadata {
        run_id,
        workflow_name,
        started_at,
        completed_at,
        duration_ms,
        metrics,
        tags,
    };

    let result = match termination {
        Termination::Completed { last_step } => {
            let final_output = last_step.and_then(|name| steps.get(&name).cloned());
            WorkflowResult {
                success: true,
                steps,
                final_output,
                error: None,
                metadata,
            }
        }
        Termination::Failed { step_name, error } => WorkflowResult {
            success: false,
            steps,
            final_output: None,
            error: Some(WorkflowError {
                message: error.report_message(),
                step_name,
                error_type: error.error_type(),
            }),
            metadata,
        },
    };
    (result, traces)
}
