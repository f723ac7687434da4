//! Per-run execution state.
//!
//! An [`ExecutionContext`] is created at the start of every run and dropped
//! at the end; runs never share one. Step outputs are recorded strictly in
//! execution order, and only completed steps' outputs are visible to the
//! steps after them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::events::{StepEvent, TraceEntry};
use crate::executor::StepContext;
use crate::metrics::RunMetrics;
use crate::template::Scope;

/// State owned by one run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    run_id: Uuid,
    workflow_name: String,
    started_at: DateTime<Utc>,
    input: Value,
    outputs: IndexMap<String, Value>,
    metrics: RunMetrics,
    traces: Vec<TraceEntry>,
}

impl ExecutionContext {
    /// Start a new run of `workflow_name` with the caller's `input`.
    #[must_use]
    pub fn new(workflow_name: impl Into<String>, input: Value) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            started_at: Utc::now(),
            input,
            outputs: IndexMap::new(),
            metrics: RunMetrics::default(),
            traces: Vec::new(),
        }
    }

    /// Unique id of this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Name of the workflow being run.
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// When the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The caller's input.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Outputs of completed steps, in execution order.
    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    /// Template scope over the input and the outputs recorded so far.
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(&self.input, &self.outputs)
    }

    /// The input handed to a step: the run input plus completed outputs by name.
    pub fn step_input(&self) -> Value {
        json!({
            "input": self.input,
            "steps": self.outputs,
        })
    }

    /// Identifiers passed to executors for `step_name`.
    pub fn step_context(&self, step_name: &str) -> StepContext {
        StepContext {
            run_id: self.run_id,
            workflow_name: self.workflow_name.clone(),
            step_name: step_name.to_string(),
        }
    }

    /// Record a step's output. Each step writes exactly once.
    pub fn record_output(&mut self, step_name: &str, output: Value) {
        debug_assert!(
            !self.outputs.contains_key(step_name),
            "step '{step_name}' recorded twice"
        );
        self.outputs.insert(step_name.to_string(), output);
        self.metrics.record_step();
    }

    /// Record token usage reported for a step.
    pub fn record_tokens(&mut self, tokens_in: u64, tokens_out: u64) {
        self.metrics.add_tokens(tokens_in, tokens_out);
    }

    /// Count a failed step.
    pub fn record_failure(&mut self) {
        self.metrics.record_failure();
    }

    /// Counters aggregated so far.
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Append a timestamped event to the trace.
    pub fn emit(&mut self, event: StepEvent) {
        self.traces.push(TraceEntry::new(event));
    }

    /// The trace recorded so far.
    pub fn traces(&self) -> &[TraceEntry] {
        &self.traces
    }

    /// Consume the context, returning the step outputs, metrics and trace.
    pub fn into_parts(self) -> (IndexMap<String, Value>, RunMetrics, Vec<TraceEntry>) {
        (self.outputs, self.metrics, self.traces)
    }
}
