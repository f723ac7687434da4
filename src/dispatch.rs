//! The step dispatcher.
//!
//! Executes scheduled steps one at a time, routing AI steps to the
//! [`AiExecutor`](crate::executor::AiExecutor) and tool steps to the
//! [`ToolExecutor`](crate::executor::ToolExecutor). Dispatch stops at the
//! first failure; the step being executed at that point is the one reported.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::context::ExecutionContext;
use crate::credentials::{self, CredentialRequest};
use crate::error::ErrorType;
use crate::events::StepEvent;
use crate::executor::{AiRequest, AiResponse, StepFailure, ToolRequest, ToolResponse};
use crate::graph::WorkflowGraph;
use crate::options::RunOptions;
use crate::result::Termination;
use crate::runtime::Runtime;
use crate::step::{StepDefinition, StepKind, Target};
use crate::{Error, Result};

/// A step that completed.
#[derive(Debug)]
struct Completed {
    output: Value,
    duration_ms: u64,
    tokens: Option<(u64, u64)>,
}

/// Runs the steps of one workflow run.
pub struct Dispatcher<'a> {
    runtime: &'a Runtime,
    options: &'a RunOptions,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher; the run timeout starts counting now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn new(runtime: &'a Runtime, options: &'a RunOptions) -> Self {
        Self {
            runtime,
            options,
            cancel: options.cancel.clone().unwrap_or_default(),
            deadline: options.timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Execute the steps at `order` sequentially, recording into `ctx`.
    #[instrument(skip_all, fields(workflow = %graph.name(), run_id = %ctx.run_id()))]
    pub async fn dispatch_all(
        &self,
        graph: &WorkflowGraph,
        order: &[usize],
        ctx: &mut ExecutionContext,
    ) -> Termination {
        let mut last_step = None;

        for &i in order {
            let step = &graph.steps()[i];
            ctx.emit(StepEvent::Started {
                step_name: step.name.clone(),
            });

            match self.dispatch(step, ctx).await {
                Ok(done) => {
                    debug!(step = %step.name, duration_ms = done.duration_ms, "Step completed");
                    if let Some((tokens_in, tokens_out)) = done.tokens {
                        ctx.record_tokens(tokens_in, tokens_out);
                    }
                    ctx.emit(StepEvent::Completed {
                        step_name: step.name.clone(),
                        duration_ms: done.duration_ms,
                        output: done.output.clone(),
                    });
                    ctx.record_output(&step.name, done.output);
                    last_step = Some(step.name.clone());
                }
                Err(error) => {
                    warn!(step = %step.name, error = %error, "Step failed; stopping run");
                    ctx.record_failure();
                    ctx.emit(StepEvent::Failed {
                        step_name: step.name.clone(),
                        error_type: error.error_type(),
                        message: error.report_message(),
                    });
                    return Termination::Failed {
                        step_name: Some(step.name.clone()),
                        error,
                    };
                }
            }
        }

        Termination::Completed { last_step }
    }

    async fn dispatch(&self, step: &StepDefinition, ctx: &ExecutionContext) -> Result<Completed> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.timeout_error());
        }

        match &step.kind {
            StepKind::Ai { target } => self.dispatch_ai(step, target, ctx).await,
            StepKind::Tool { target, params } => {
                self.dispatch_tool(step, target, params, ctx).await
            }
        }
    }

    async fn dispatch_ai(
        &self,
        step: &StepDefinition,
        target: &Target,
        ctx: &ExecutionContext,
    ) -> Result<Completed> {
        let provider = target.namespace();
        let config = self.runtime.config();
        let credential = credentials::require(
            self.runtime.credentials(),
            CredentialRequest {
                provider,
                overrides: &self.options.credentials,
                config: &config,
            },
        )?;

        let scope = ctx.scope();
        let prompt = step.config.prompt.as_deref().map(|p| scope.render(p)).transpose()?;
        let system_prompt = step
            .config
            .system_prompt
            .as_deref()
            .map(|p| scope.render(p))
            .transpose()?;

        let request = AiRequest {
            context: ctx.step_context(&step.name),
            provider: provider.to_string(),
            model: target.name().to_string(),
            prompt,
            system_prompt,
            input: ctx.step_input(),
            schema: step.config.schema.clone(),
            retry: step.config.retry.clone(),
            metadata: step.config.metadata.clone(),
            credential,
            base_url: config.base_url(provider).map(str::to_string),
            cancel: self.cancel.clone(),
        };

        debug!(step = %step.name, target = %target, "Dispatching AI step");
        let started = Instant::now();
        let call = AssertUnwindSafe(self.runtime.ai_executor().execute(request)).catch_unwind();
        let response = match self.bounded(call).await? {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => AiResponse::failure(
                collaborator_type(&error, ErrorType::Provider),
                error.report_message(),
            ),
            Err(panic) => AiResponse::failure(ErrorType::Provider, panic_message(panic)),
        };

        let duration_ms = reported_or_measured(response.duration_ms, started.elapsed());
        let tokens = match (response.tokens_in, response.tokens_out) {
            (None, None) => None,
            (tokens_in, tokens_out) => Some((tokens_in.unwrap_or(0), tokens_out.unwrap_or(0))),
        };
        let output = into_output(&step.name, response.result)?;
        Ok(Completed {
            output,
            duration_ms,
            tokens,
        })
    }

    async fn dispatch_tool(
        &self,
        step: &StepDefinition,
        target: &Target,
        params: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Completed> {
        let server = self.runtime.servers().lookup(target.namespace())?.clone();
        let params = ctx.scope().resolve(&Value::Object(params.clone()))?;

        let request = ToolRequest {
            context: ctx.step_context(&step.name),
            server,
            tool: target.name().to_string(),
            params,
            cancel: self.cancel.clone(),
        };

        debug!(step = %step.name, target = %target, "Dispatching tool step");
        let started = Instant::now();
        let call = AssertUnwindSafe(self.runtime.tool_executor().execute(request)).catch_unwind();
        let response = match self.bounded(call).await? {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => ToolResponse::failure(
                collaborator_type(&error, ErrorType::Tool),
                error.report_message(),
            ),
            Err(panic) => ToolResponse::failure(ErrorType::Tool, panic_message(panic)),
        };

        let duration_ms = reported_or_measured(response.duration_ms, started.elapsed());
        let output = into_output(&step.name, response.result)?;
        Ok(Completed {
            output,
            duration_ms,
            tokens: None,
        })
    }

    /// Race `fut` against cancellation and the run deadline.
    async fn bounded<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let timed = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| self.timeout_error()),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = timed => result,
        }
    }

    fn timeout_error(&self) -> Error {
        let ms = self
            .options
            .timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Error::Timeout(ms)
    }
}

/// Category for an `Err` returned by a collaborator.
fn collaborator_type(error: &Error, fallback: ErrorType) -> ErrorType {
    match error.error_type() {
        ErrorType::Unknown => fallback,
        other => other,
    }
}

fn into_output(step_name: &str, result: std::result::Result<Value, StepFailure>) -> Result<Value> {
    result.map_err(|failure| Error::Step {
        step_name: step_name.to_string(),
        error_type: failure.error_type,
        message: failure.message,
    })
}

fn reported_or_measured(reported_ms: u64, elapsed: Duration) -> u64 {
    if reported_ms > 0 {
        reported_ms
    } else {
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("executor panicked: {detail}")
}
