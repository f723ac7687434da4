//! # llm-dag
//!
//! Fluent, type-checked construction and local execution of multi-step
//! workflows made of AI-model calls and tool invocations.
//!
//! A workflow is a named list of steps. Each step is bound either to a
//! `provider:model` target or to a `server:tool` target, may depend on steps
//! declared before it, and can reference the workflow input and earlier
//! outputs through `{{input.x}}` / `{{steps.NAME.path}}` templates.
//!
//! ## Core Concepts
//!
//! - **WorkflowBuilder**: Entry point of the fluent builder chain
//! - **StepChain**: Continues a chain with another step or finishes it
//! - **Workflow**: A validated graph, runnable any number of times
//! - **Runtime**: Config plus the AI executor, tool executor, tool-server
//!   registry, credential resolver and telemetry reporter a run uses
//! - **RunOptions**: Per-run credentials, timeout, cancellation and tags
//! - **WorkflowResult**: Outcome of a run; never an `Err`
//!
//! Model and tool calls are delegated to [`AiExecutor`] and
//! [`ToolExecutor`] implementations; [`mock`] provides scripted ones.
//!
//! ## Example: Two-Step Pipeline
//!
//! ```rust
//! use std::sync::Arc;
//! use llm_dag::{Config, Runtime, StepChain, WorkflowBuilder};
//! use llm_dag::mock::{MockAiExecutor, MockToolExecutor};
//! use llm_dag::registry::ToolServer;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let runtime = Runtime::new()
//!     .with_config(Config::new().with_credential("openai", "sk-test"))
//!     .with_ai_executor(MockAiExecutor::new().with_default("a short summary"))
//!     .with_tool_executor(MockToolExecutor::new())
//!     .with_server(ToolServer::http("crm", "http://localhost:9000/mcp"));
//!
//! let result = WorkflowBuilder::new("summarize")
//!     .with_runtime(Arc::new(runtime))
//!     .add_step("summary").unwrap()
//!     .model("openai:gpt-4o").unwrap()
//!     .prompt("Summarize {{input.text}}")
//!     .add_step("save").unwrap()
//!     .tool("crm:create_note").unwrap()
//!     .params(json!({"body": "{{steps.summary}}"})).unwrap()
//!     .depends_on(["summary"]).unwrap()
//!     .run(json!({"text": "the quarterly report"}))
//!     .await;
//!
//! assert!(result.success);
//! assert_eq!(result.output("summary"), Some(&json!("a short summary")));
//! assert_eq!(result.final_output, Some(json!({"body": "a short summary"})));
//! # });
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod metrics;
pub mod mock;
pub mod options;
pub mod registry;
pub mod result;
pub mod runtime;
pub mod schedule;
pub mod step;
pub mod telemetry;
pub mod template;
pub mod workflow;

pub use builder::{
    CompletedStep, ModelBoundStep, StepBuilder, StepChain, ToolAwaitingParams, ToolBoundStep,
    WorkflowBuilder,
};
pub use config::Config;
pub use context::ExecutionContext;
pub use error::{Error, ErrorType, Result};
pub use events::{StepEvent, TraceEntry};
pub use executor::{
    AiExecutor, AiRequest, AiResponse, StepFailure, ToolExecutor, ToolRequest, ToolResponse,
};
pub use graph::WorkflowGraph;
pub use metrics::RunMetrics;
pub use options::RunOptions;
pub use result::{RunMetadata, WorkflowError, WorkflowResult};
pub use runtime::Runtime;
pub use step::{RetryPolicy, StepConfig, StepDefinition, StepKind, Target};
pub use workflow::Workflow;
