//! A validated, runnable workflow.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::context::ExecutionContext;
use crate::dispatch::Dispatcher;
use crate::graph::WorkflowGraph;
use crate::options::RunOptions;
use crate::result::{self, WorkflowResult};
use crate::runtime::{self, Runtime};
use crate::telemetry::RunRecord;
use crate::{Error, Result};

/// A workflow graph that passed validation, ready to run any number of times.
///
/// `Workflow` owns its graph and execution order, creates a fresh
/// [`ExecutionContext`] for each run, and returns a [`WorkflowResult`]
/// whatever the outcome. Runs may execute concurrently; they share nothing
/// but the runtime's read-only configuration.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use llm_dag::{Config, Runtime, StepChain, WorkflowBuilder};
/// use llm_dag::mock::MockAiExecutor;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let runtime = Runtime::new()
///     .with_config(Config::new())
///     .with_ai_executor(MockAiExecutor::new());
///
/// let workflow = WorkflowBuilder::new("greet")
///     .with_runtime(Arc::new(runtime))
///     .add_step("hello").unwrap()
///     .model("mock:echo").unwrap()
///     .prompt("Hello, {{input.name}}!")
///     .build()
///     .unwrap();
///
/// let result = workflow.run(json!({"name": "Ferris"})).await;
/// assert!(result.success);
/// assert_eq!(result.final_output, Some(json!("Hello, Ferris!")));
/// # });
/// ```
#[derive(Clone)]
pub struct Workflow {
    graph: WorkflowGraph,
    order: Arc<[usize]>,
    runtime: Option<Arc<Runtime>>,
}

impl Workflow {
    /// Validate `graph` and compute its execution order.
    pub fn new(graph: WorkflowGraph) -> Result<Self> {
        graph.validate()?;
        let order = graph.execution_order()?;
        Ok(Self {
            graph,
            order: order.into(),
            runtime: None,
        })
    }

    /// Run against `runtime` instead of the process-wide default.
    pub fn with_runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub(crate) fn with_runtime_opt(mut self, runtime: Option<Arc<Runtime>>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Returns the name of this workflow.
    pub fn name(&self) -> &str {
        self.graph.name()
    }

    /// The validated graph.
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Step names in the order they will execute.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.graph.steps()[i].name.as_str())
            .collect()
    }

    /// Run with default options.
    pub async fn run(&self, input: Value) -> WorkflowResult {
        self.run_with(input, RunOptions::default()).await
    }

    /// Run the workflow.
    ///
    /// Never fails: every error, including a missing runtime, is recovered
    /// into [`WorkflowResult::error`].
    #[instrument(skip_all, fields(workflow = %self.graph.name()))]
    pub async fn run_with(&self, input: Value, options: RunOptions) -> WorkflowResult {
        let Some(runtime) = self.runtime.clone().or_else(runtime::global) else {
            warn!("No runtime available");
            return WorkflowResult::rejected(self.graph.name(), Error::NoRuntime, options.metadata);
        };

        let mut ctx = ExecutionContext::new(self.graph.name(), input);
        info!(run_id = %ctx.run_id(), steps = self.order.len(), "Starting workflow run");

        let termination = Dispatcher::new(&runtime, &options)
            .dispatch_all(&self.graph, &self.order, &mut ctx)
            .await;

        let (result, traces) = result::assemble_with_trace(ctx, termination, options.metadata);

        info!(
            run_id = %result.metadata.run_id,
            success = result.success,
            duration_ms = result.metadata.duration_ms,
            "Workflow run finished"
        );

        if runtime.config().telemetry_enabled {
            runtime.telemetry().enqueue(RunRecord::from_run(&result, &traces));
        }
        result
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.graph.name())
            .field("order", &self.execution_order())
            .field("has_runtime", &self.runtime.is_some())
            .finish()
    }
}
