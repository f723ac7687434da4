//! The fluent builder chain.
//!
//! Each state of the chain is its own type, so a step that has not been
//! bound to a model or a tool cannot be extended or run:
//!
//! ```text
//! WorkflowBuilder ─add_step─▶ StepBuilder ─model─▶ ModelBoundStep ─depends_on─▶ CompletedStep
//!                                        └─tool──▶ ToolAwaitingParams ─params─▶ ToolBoundStep ─depends_on─▶ CompletedStep
//! ```
//!
//! [`ModelBoundStep`], [`ToolBoundStep`] and [`CompletedStep`] are the
//! complete states; they implement [`StepChain`], which continues the chain
//! with another step or finishes it with `build` / `run`.
//!
//! Step names are runtime strings, so the remaining mistakes (a duplicate
//! name, a dependency on a step not declared earlier, a malformed target)
//! are rejected by the call that introduces them, before anything runs.
//!
//! Every call consumes its builder and returns a new one. Cloning a builder
//! forks the chain; the step history is shared copy-on-write, so the fork
//! never changes the original.
//!
//! # Example
//!
//! ```rust
//! use llm_dag::{StepChain, WorkflowBuilder};
//! use serde_json::json;
//!
//! # fn main() -> llm_dag::Result<()> {
//! let workflow = WorkflowBuilder::new("research")
//!     .add_step("plan")?
//!     .model("openai:gpt-4o")?
//!     .prompt("Outline a report on {{input.topic}}")
//!     .add_step("search")?
//!     .tool("web:search")?
//!     .params(json!({"query": "{{input.topic}}"}))?
//!     .add_step("write")?
//!     .model("anthropic:claude-sonnet")?
//!     .prompt("Outline: {{steps.plan}}\nSources: {{steps.search}}")
//!     .depends_on(["plan", "search"])?
//!     .build()?;
//!
//! assert_eq!(workflow.execution_order(), vec!["plan", "search", "write"]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::graph::{Schedule, Webhook, WorkflowGraph};
use crate::options::RunOptions;
use crate::result::WorkflowResult;
use crate::runtime::Runtime;
use crate::step::{RetryPolicy, StepConfig, StepDefinition, Target};
use crate::workflow::Workflow;
use crate::{Error, Result};

/// Start of the chain: a named, empty workflow.
#[derive(Clone)]
pub struct WorkflowBuilder {
    graph: WorkflowGraph,
    runtime: Option<Arc<Runtime>>,
}

impl WorkflowBuilder {
    /// Start an empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: WorkflowGraph::new(name),
            runtime: None,
        }
    }

    /// Run against `runtime` instead of the process-wide default.
    pub fn with_runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Record a webhook trigger for the hosted service.
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.graph.set_webhook(Webhook {
            url: url.into(),
            secret: None,
        });
        self
    }

    /// Record a cron schedule for the hosted service.
    pub fn with_schedule(mut self, cron: impl Into<String>) -> Self {
        self.graph.set_schedule(Schedule {
            cron: cron.into(),
            timezone: None,
        });
        self
    }

    /// Declare the next step. Fails if the name is already taken.
    pub fn add_step(self, name: impl Into<String>) -> Result<StepBuilder> {
        self.add_step_with(name, StepConfig::default())
    }

    /// Declare the next step with initial options.
    pub fn add_step_with(self, name: impl Into<String>, config: StepConfig) -> Result<StepBuilder> {
        let name = name.into();
        if self.graph.contains(&name) {
            return Err(Error::DuplicateStep(name));
        }
        Ok(StepBuilder {
            chain: self,
            name,
            config,
        })
    }

    /// The graph built so far.
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    fn push(mut self, step: StepDefinition) -> Result<Self> {
        self.graph.push(step)?;
        Ok(self)
    }

    /// Attach dependencies to the last declared step.
    fn bind_dependencies<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let steps = self.graph.steps();
        let Some((current, earlier)) = steps.split_last() else {
            return Ok(self);
        };

        if let Some(missing) = names
            .iter()
            .find(|n| !earlier.iter().any(|s| &s.name == *n))
        {
            return Err(Error::UnknownDependency {
                step: current.name.clone(),
                dependency: missing.clone(),
            });
        }

        self.graph.refine_last(|step| {
            for name in names {
                if !step.depends_on.contains(&name) {
                    step.depends_on.push(name);
                }
            }
        });
        Ok(self)
    }

    fn refine<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut StepConfig),
    {
        self.graph.refine_last(|step| f(&mut step.config));
        self
    }
}

/// A declared step that is not yet bound to a model or a tool.
pub struct StepBuilder {
    chain: WorkflowBuilder,
    name: String,
    config: StepConfig,
}

impl StepBuilder {
    /// Bind the step to a `provider:model` target.
    pub fn model(self, target: &str) -> Result<ModelBoundStep> {
        let target = Target::model(target)?;
        let step = StepDefinition::ai(self.name, target).with_config(self.config);
        Ok(ModelBoundStep {
            chain: self.chain.push(step)?,
        })
    }

    /// Bind the step to a `server:tool` target; parameters come next.
    pub fn tool(self, target: &str) -> Result<ToolAwaitingParams> {
        let target = Target::tool(target)?;
        Ok(ToolAwaitingParams {
            chain: self.chain,
            name: self.name,
            config: self.config,
            target,
        })
    }
}

/// A tool step that still needs its parameters.
pub struct ToolAwaitingParams {
    chain: WorkflowBuilder,
    name: String,
    config: StepConfig,
    target: Target,
}

impl ToolAwaitingParams {
    /// Set the tool arguments: a JSON object, or `null` for none.
    pub fn params(self, params: impl Into<Value>) -> Result<ToolBoundStep> {
        let params = match params.into() {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(Error::InvalidParams {
                    step: self.name,
                    found: json_type(&other),
                })
            }
        };
        let step = StepDefinition::tool(self.name, self.target, params).with_config(self.config);
        Ok(ToolBoundStep {
            chain: self.chain.push(step)?,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An AI step bound to its model; prompt and options may still be refined.
#[derive(Clone)]
pub struct ModelBoundStep {
    chain: WorkflowBuilder,
}

impl ModelBoundStep {
    /// Set the user prompt. `{{input...}}` and `{{steps.X...}}` are resolved at run time.
    pub fn prompt(self, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            chain: self.chain.refine(|c| c.prompt = Some(text)),
        }
    }

    /// Set the system prompt; placeholders are resolved at run time.
    pub fn system_prompt(self, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            chain: self.chain.refine(|c| c.system_prompt = Some(text)),
        }
    }

    /// Request structured output matching `schema`.
    pub fn schema(self, schema: Value) -> Self {
        Self {
            chain: self.chain.refine(|c| c.schema = Some(schema)),
        }
    }

    /// Retry policy passed through to the AI executor.
    pub fn retry(self, policy: RetryPolicy) -> Self {
        Self {
            chain: self.chain.refine(|c| c.retry = Some(policy)),
        }
    }

    /// Attach a metadata entry passed through to the AI executor.
    pub fn metadata(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self {
            chain: self.chain.refine(|c| {
                c.metadata.insert(key, value);
            }),
        }
    }

    /// Run after the named steps, which must already be declared.
    pub fn depends_on<I, S>(self, names: I) -> Result<CompletedStep>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(CompletedStep {
            chain: self.chain.bind_dependencies(names)?,
        })
    }
}

/// A tool step with its parameters.
#[derive(Clone)]
pub struct ToolBoundStep {
    chain: WorkflowBuilder,
}

impl ToolBoundStep {
    /// Attach a metadata entry to the tool step.
    pub fn metadata(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self {
            chain: self.chain.refine(|c| {
                c.metadata.insert(key, value);
            }),
        }
    }

    /// Run after the named steps, which must already be declared.
    pub fn depends_on<I, S>(self, names: I) -> Result<CompletedStep>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(CompletedStep {
            chain: self.chain.bind_dependencies(names)?,
        })
    }
}

/// A step whose dependencies are declared.
#[derive(Clone)]
pub struct CompletedStep {
    chain: WorkflowBuilder,
}

/// Methods shared by every complete state of the chain.
///
/// Bring this trait into scope to continue or finish a chain.
#[async_trait]
pub trait StepChain: Sized + Send {
    /// Give up the chain built so far.
    fn into_builder(self) -> WorkflowBuilder;

    /// The graph built so far.
    fn graph(&self) -> &WorkflowGraph;

    /// Declare the next step. Fails if the name is already taken.
    fn add_step(self, name: impl Into<String>) -> Result<StepBuilder> {
        self.into_builder().add_step(name)
    }

    /// Declare the next step with initial options.
    fn add_step_with(self, name: impl Into<String>, config: StepConfig) -> Result<StepBuilder> {
        self.into_builder().add_step_with(name, config)
    }

    /// Validate the graph and produce a reusable [`Workflow`].
    fn build(self) -> Result<Workflow> {
        let builder = self.into_builder();
        Ok(Workflow::new(builder.graph)?.with_runtime_opt(builder.runtime))
    }

    /// Build and run once with default options.
    async fn run(self, input: Value) -> WorkflowResult {
        self.run_with(input, RunOptions::default()).await
    }

    /// Build and run once. Validation failures are reported in the result.
    async fn run_with(self, input: Value, options: RunOptions) -> WorkflowResult {
        let name = self.graph().name().to_string();
        match self.build() {
            Ok(workflow) => workflow.run_with(input, options).await,
            Err(error) => WorkflowResult::rejected(&name, error, options.metadata),
        }
    }
}

impl StepChain for ModelBoundStep {
    fn into_builder(self) -> WorkflowBuilder {
        self.chain
    }

    fn graph(&self) -> &WorkflowGraph {
        &self.chain.graph
    }
}

impl StepChain for ToolBoundStep {
    fn into_builder(self) -> WorkflowBuilder {
        self.chain
    }

    fn graph(&self) -> &WorkflowGraph {
        &self.chain.graph
    }
}

impl StepChain for CompletedStep {
    fn into_builder(self) -> WorkflowBuilder {
        self.chain
    }

    fn graph(&self) -> &WorkflowGraph {
        &self.chain.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;
    use serde_json::json;

    #[test]
    fn test_chain_accumulates_steps_in_order() {
        let chain = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .prompt("hi")
            .system_prompt("be brief")
            .retry(RetryPolicy::fixed(2, 100))
            .add_step("b")
            .unwrap()
            .tool("crm:search")
            .unwrap()
            .params(json!({"q": "{{steps.a}}"}))
            .unwrap()
            .depends_on(["a"])
            .unwrap();

        let graph = chain.graph();
        assert_eq!(graph.len(), 2);

        let a = graph.step("a").unwrap();
        assert!(a.is_ai());
        assert_eq!(a.config.prompt.as_deref(), Some("hi"));
        assert_eq!(a.config.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(a.config.retry, Some(RetryPolicy::fixed(2, 100)));

        let b = graph.step("b").unwrap();
        assert_eq!(b.depends_on, vec!["a"]);
        match &b.kind {
            StepKind::Tool { target, params } => {
                assert_eq!(target.to_string(), "crm:search");
                assert_eq!(params["q"], json!("{{steps.a}}"));
            }
            other => panic!("expected tool step, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_name_rejected_at_add_step() {
        let err = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .add_step("a")
            .err()
            .unwrap();
        assert!(matches!(err, Error::DuplicateStep(name) if name == "a"));
    }

    #[test]
    fn test_undeclared_dependency_rejected() {
        let err = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .add_step("c")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .depends_on(["a", "z"])
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::UnknownDependency { ref step, ref dependency }
                if step == "c" && dependency == "z"
        ));
    }

    #[test]
    fn test_step_cannot_depend_on_itself() {
        let err = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .depends_on(["a"])
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownDependency { .. }));
    }

    #[test]
    fn test_malformed_targets_rejected() {
        let err = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .model("gpt-4o")
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidTarget { .. }));

        let err = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .tool("crm/search")
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidTarget { .. }));
    }

    #[test]
    fn test_params_must_be_an_object() {
        let err = WorkflowBuilder::new("wf")
            .add_step("t")
            .unwrap()
            .tool("crm:search")
            .unwrap()
            .params(json!(["not", "an", "object"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidParams { found: "array", .. }));

        let ok = WorkflowBuilder::new("wf")
            .add_step("t")
            .unwrap()
            .tool("crm:search")
            .unwrap()
            .params(Value::Null)
            .unwrap();
        assert!(ok.graph().step("t").is_some());
    }

    #[test]
    fn test_forked_chain_does_not_alias() {
        let base = WorkflowBuilder::new("wf")
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap();

        let fork = base.clone().prompt("forked");
        let extended = fork.clone().add_step("b").unwrap().model("openai:gpt-4o").unwrap();

        assert!(base.graph().step("a").unwrap().config.prompt.is_none());
        assert_eq!(fork.graph().len(), 1);
        assert_eq!(fork.graph().step("a").unwrap().config.prompt.as_deref(), Some("forked"));
        assert_eq!(extended.graph().len(), 2);
    }

    #[test]
    fn test_features_recorded_on_graph() {
        let workflow = WorkflowBuilder::new("wf")
            .with_webhook("https://hooks.example/run")
            .with_schedule("*/5 * * * *")
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            workflow.graph().webhook().map(|w| w.url.as_str()),
            Some("https://hooks.example/run")
        );
        assert_eq!(workflow.graph().schedule().map(|s| s.cron.as_str()), Some("*/5 * * * *"));
    }

    #[test]
    fn test_same_chain_twice_schedules_identically() {
        let build = || {
            WorkflowBuilder::new("wf")
                .add_step("a")
                .unwrap()
                .model("openai:gpt-4o")
                .unwrap()
                .add_step("b")
                .unwrap()
                .model("openai:gpt-4o")
                .unwrap()
                .depends_on(["a"])
                .unwrap()
                .add_step("c")
                .unwrap()
                .model("openai:gpt-4o")
                .unwrap()
                .depends_on(["a", "b"])
                .unwrap()
                .build()
                .unwrap()
        };
        let (first, second) = (build(), build());
        assert_eq!(first.execution_order(), second.execution_order());
        assert_eq!(first.graph(), second.graph());
    }

    #[test]
    fn test_add_step_with_initial_config() {
        let chain = WorkflowBuilder::new("wf")
            .add_step_with("a", StepConfig::new().with_metadata("owner", "ops"))
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .metadata("tier", 2);
        let a = chain.graph().step("a").unwrap();
        assert_eq!(a.config.metadata["owner"], json!("ops"));
        assert_eq!(a.config.metadata["tier"], json!(2));
    }
}
