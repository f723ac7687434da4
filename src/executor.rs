//! Collaborator seams: the AI adapter and the tool executor.
//!
//! The dispatcher builds an [`AiRequest`] or [`ToolRequest`] for each step
//! and hands it to the matching executor. Executors own the actual model and
//! tool calls, including any retry loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::credentials::Credential;
use crate::error::ErrorType;
use crate::registry::ToolServer;
use crate::step::RetryPolicy;
use crate::Result;

/// A categorized failure reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
}

impl StepFailure {
    /// Create a failure of the given category.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }
}

/// Identifies the run and step a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub step_name: String,
}

/// One model invocation.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub context: StepContext,
    pub provider: String,
    pub model: String,
    /// User prompt with placeholders resolved.
    pub prompt: Option<String>,
    /// System prompt with placeholders resolved.
    pub system_prompt: Option<String>,
    /// `{"input": <run input>, "steps": {<name>: <output>, ...}}` for completed steps.
    pub input: Value,
    pub schema: Option<Value>,
    pub retry: Option<RetryPolicy>,
    pub metadata: Map<String, Value>,
    /// `None` only for keyless providers.
    pub credential: Option<Credential>,
    pub base_url: Option<String>,
    /// Fires when the caller aborts the run.
    pub cancel: CancellationToken,
}

/// The outcome of a model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AiResponse {
    pub result: std::result::Result<Value, StepFailure>,
    pub duration_ms: u64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
}

impl AiResponse {
    /// A successful response carrying `output`.
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            result: Ok(output.into()),
            duration_ms: 0,
            tokens_in: None,
            tokens_out: None,
        }
    }

    /// A failed response.
    pub fn failure(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            result: Err(StepFailure::new(error_type, message)),
            duration_ms: 0,
            tokens_in: None,
            tokens_out: None,
        }
    }

    /// Attach token usage.
    pub fn with_usage(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens_in = Some(tokens_in);
        self.tokens_out = Some(tokens_out);
        self
    }

    /// Report the call's own duration instead of the measured one.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Whether the model call succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub context: StepContext,
    pub server: ToolServer,
    pub tool: String,
    /// Parameters with placeholders resolved.
    pub params: Value,
    pub cancel: CancellationToken,
}

/// The outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub result: std::result::Result<Value, StepFailure>,
    pub duration_ms: u64,
}

impl ToolResponse {
    /// A successful response carrying `output`.
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            result: Ok(output.into()),
            duration_ms: 0,
        }
    }

    /// A failed response.
    pub fn failure(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            result: Err(StepFailure::new(error_type, message)),
            duration_ms: 0,
        }
    }

    /// Whether the tool call succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Executes AI steps.
///
/// Returning `Err` (or panicking) is treated the same as a failed
/// [`AiResponse`]; neither escapes the run.
#[async_trait]
pub trait AiExecutor: Send + Sync {
    async fn execute(&self, request: AiRequest) -> Result<AiResponse>;
}

/// Executes tool steps against a registered server.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, request: ToolRequest) -> Result<ToolResponse>;
}

/// Placeholder executor that fails every step with a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl AiExecutor for Unconfigured {
    async fn execute(&self, request: AiRequest) -> Result<AiResponse> {
        Ok(AiResponse::failure(
            ErrorType::Configuration,
            format!(
                "no AI executor configured for '{}:{}'",
                request.provider, request.model
            ),
        ))
    }
}

#[async_trait]
impl ToolExecutor for Unconfigured {
    async fn execute(&self, request: ToolRequest) -> Result<ToolResponse> {
        Ok(ToolResponse::failure(
            ErrorType::Configuration,
            format!(
                "no tool executor configured for '{}:{}'",
                request.server.name, request.tool
            ),
        ))
    }
}
