//! Scripted executors for tests.
//!
//! Return configurable responses without calling any model or tool server,
//! and record every request for later assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ErrorType;
use crate::executor::{
    AiExecutor, AiRequest, AiResponse, StepFailure, ToolExecutor, ToolRequest, ToolResponse,
};
use crate::Result;

/// Mock AI executor.
///
/// Resolution order for each request: a response scripted for the step
/// name, then the FIFO queue, then an echo of the prompt (or
/// `"Mock response"` when the step has no prompt).
///
/// # Example
///
/// ```rust
/// use llm_dag::mock::MockAiExecutor;
/// use llm_dag::executor::AiResponse;
/// use serde_json::json;
///
/// let ai = MockAiExecutor::new()
///     .with_step("plan", AiResponse::success(json!({"bullets": 3})))
///     .with_default("fallback");
/// assert!(ai.requests().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MockAiExecutor {
    by_step: Arc<Mutex<HashMap<String, AiResponse>>>,
    queue: Arc<Mutex<VecDeque<AiResponse>>>,
    default_output: Option<Value>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<AiRequest>>>,
}

impl MockAiExecutor {
    /// A mock that echoes prompts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `step` with `response`.
    pub fn with_step(self, step: impl Into<String>, response: AiResponse) -> Self {
        self.by_step.lock().unwrap().insert(step.into(), response);
        self
    }

    /// Answer `step` with a failure.
    pub fn with_failure(
        self,
        step: impl Into<String>,
        error_type: ErrorType,
        message: impl Into<String>,
    ) -> Self {
        self.with_step(step, AiResponse::failure(error_type, message))
    }

    /// Output used when nothing is scripted, instead of echoing the prompt.
    pub fn with_default(mut self, output: impl Into<Value>) -> Self {
        self.default_output = Some(output.into());
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response for the next unscripted request.
    pub fn queue_response(&self, response: AiResponse) {
        self.queue.lock().unwrap().push_back(response);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<AiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Names of the steps executed so far, in call order.
    pub fn called_steps(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.context.step_name.clone())
            .collect()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<AiRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AiExecutor for MockAiExecutor {
    async fn execute(&self, request: AiRequest) -> Result<AiResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = self.by_step.lock().unwrap().get(&request.context.step_name) {
            return Ok(response.clone());
        }
        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return Ok(response);
        }

        let output = match (&self.default_output, request.prompt) {
            (Some(default), _) => default.clone(),
            (None, Some(prompt)) => Value::String(prompt),
            (None, None) => Value::String("Mock response".to_string()),
        };
        Ok(AiResponse::success(output))
    }
}

type ToolHandler = Arc<dyn Fn(&Value) -> std::result::Result<Value, StepFailure> + Send + Sync>;

/// Mock tool executor with per-tool handlers.
///
/// Tools without a handler echo their resolved parameters back.
#[derive(Clone, Default)]
pub struct MockToolExecutor {
    handlers: HashMap<String, ToolHandler>,
    requests: Arc<Mutex<Vec<ToolRequest>>>,
}

impl MockToolExecutor {
    /// A mock that echoes parameters back.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle calls to `tool` (on any server) with `f`.
    pub fn with_handler<F>(mut self, tool: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, StepFailure> + Send + Sync + 'static,
    {
        self.handlers.insert(tool.into(), Arc::new(f));
        self
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, request: ToolRequest) -> Result<ToolResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let result = match self.handlers.get(&request.tool) {
            Some(handler) => handler(&request.params),
            None => Ok(request.params.clone()),
        };
        Ok(ToolResponse {
            result,
            duration_ms: 0,
        })
    }
}
