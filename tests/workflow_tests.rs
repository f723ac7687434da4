use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use llm_dag::credentials::{CredentialSource, TieredCredentials};
use llm_dag::executor::{AiResponse, StepFailure};
use llm_dag::mock::{MockAiExecutor, MockToolExecutor};
use llm_dag::registry::ToolServer;
use llm_dag::telemetry::{MemoryReporter, RunStatus, StepStatus};
use llm_dag::{
    Config, Error, ErrorType, RunOptions, Runtime, StepChain, StepDefinition, Target, Workflow,
    WorkflowBuilder, WorkflowGraph,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn runtime_with(ai: MockAiExecutor) -> Arc<Runtime> {
    Arc::new(
        Runtime::new()
            .with_config(Config::new().with_telemetry(false))
            .with_ai_executor(ai)
            .with_tool_executor(MockToolExecutor::new()),
    )
}

fn two_step(runtime: Arc<Runtime>) -> Workflow {
    WorkflowBuilder::new("two-step")
        .with_runtime(runtime)
        .add_step("A")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .prompt("first {{input.topic}}")
        .add_step("B")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .prompt("second after {{steps.A}}")
        .depends_on(["A"])
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_two_dependent_steps_succeed() {
    let ai = MockAiExecutor::new()
        .with_step("A", AiResponse::success("outA"))
        .with_step("B", AiResponse::success("outB"));
    let result = two_step(runtime_with(ai)).run(json!({"topic": "rust"})).await;

    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps["A"], json!("outA"));
    assert_eq!(result.steps["B"], json!("outB"));
    assert_eq!(result.final_output, Some(json!("outB")));
    assert_eq!(result.metadata.workflow_name, "two-step");
    assert!(result.metadata.started_at <= result.metadata.completed_at);
    assert_eq!(result.metadata.metrics.steps_completed, 2);
}

#[tokio::test]
async fn test_failure_in_first_step_stops_the_run() {
    let ai = MockAiExecutor::new().with_failure("A", ErrorType::RateLimit, "slow down");
    let result = two_step(runtime_with(ai.clone())).run(json!({"topic": "rust"})).await;

    assert!(!result.success);
    assert!(result.steps.is_empty());
    assert!(result.final_output.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.step_name.as_deref(), Some("A"));
    assert_eq!(error.error_type, ErrorType::RateLimit);
    assert_eq!(error.message, "slow down");
    assert_eq!(ai.called_steps(), vec!["A"]);
}

#[tokio::test]
async fn test_failure_at_k_keeps_only_earlier_outputs() {
    let ai = MockAiExecutor::new()
        .with_default("ok")
        .with_failure("c", ErrorType::Provider, "");
    let runtime = runtime_with(ai.clone());

    let result = WorkflowBuilder::new("chain")
        .with_runtime(runtime)
        .add_step("a")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .add_step("b")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["a"])
        .unwrap()
        .add_step("c")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["b"])
        .unwrap()
        .add_step("d")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["c"])
        .unwrap()
        .run(json!({}))
        .await;

    assert!(!result.success);
    assert_eq!(result.steps.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(result.failed_step(), Some("c"));
    assert_eq!(result.error.unwrap().message, "Step failed without a message");
    assert!(!ai.called_steps().contains(&"d".to_string()));
}

#[test]
fn test_undeclared_dependency_fails_at_construction() {
    let err = WorkflowBuilder::new("wf")
        .add_step("A")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .add_step("C")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["Z"])
        .err()
        .unwrap();
    assert!(err.is_graph_error());
    assert_eq!(err.error_type(), ErrorType::Validation);
}

#[test]
fn test_diamond_schedules_dependencies_first() {
    let workflow = WorkflowBuilder::new("wf")
        .add_step("A")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .add_step("B")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["A"])
        .unwrap()
        .add_step("C")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["A", "B"])
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(workflow.execution_order(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_unregistered_tool_server_is_a_configuration_error() {
    let tools = MockToolExecutor::new();
    let runtime = Arc::new(
        Runtime::new()
            .with_config(Config::new().with_telemetry(false))
            .with_ai_executor(MockAiExecutor::new())
            .with_tool_executor(tools.clone()),
    );

    let result = WorkflowBuilder::new("wf")
        .with_runtime(runtime)
        .add_step("lookup")
        .unwrap()
        .tool("crm:search")
        .unwrap()
        .params(json!({"q": "acme"}))
        .unwrap()
        .add_step("after")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .depends_on(["lookup"])
        .unwrap()
        .run(json!({}))
        .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.step_name.as_deref(), Some("lookup"));
    assert_eq!(error.error_type, ErrorType::Configuration);
    assert!(error.message.contains("crm"));
    assert!(tools.requests().is_empty());
    assert!(result.steps.is_empty());
}

#[tokio::test]
async fn test_disabled_tool_server_is_rejected() {
    let runtime = Arc::new(
        Runtime::new()
            .with_config(Config::new().with_telemetry(false))
            .with_tool_executor(MockToolExecutor::new())
            .with_server(ToolServer::http("crm", "http://localhost:9000/mcp").disabled()),
    );
    let result = WorkflowBuilder::new("wf")
        .with_runtime(runtime)
        .add_step("lookup")
        .unwrap()
        .tool("crm:search")
        .unwrap()
        .params(json!({}))
        .unwrap()
        .run(json!({}))
        .await;

    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Configuration);
    assert!(error.message.contains("disabled"));
}

#[tokio::test]
async fn test_tool_failure_is_passed_through() {
    let tools = MockToolExecutor::new().with_handler("search", |_| {
        Err(StepFailure::new(ErrorType::Tool, "index unavailable"))
    });
    let runtime = Arc::new(
        Runtime::new()
            .with_config(Config::new().with_telemetry(false))
            .with_tool_executor(tools)
            .with_server(ToolServer::stdio("crm", "crm-server", ["--stdio"])),
    );
    let result = WorkflowBuilder::new("wf")
        .with_runtime(runtime)
        .add_step("lookup")
        .unwrap()
        .tool("crm:search")
        .unwrap()
        .params(json!({"q": "{{input.q}}"}))
        .unwrap()
        .run(json!({"q": "acme"}))
        .await;

    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Tool);
    assert_eq!(error.message, "index unavailable");
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let ai = MockAiExecutor::new().with_delay(Duration::from_millis(10));
    let workflow = two_step(runtime_with(ai));

    let (left, right) = tokio::join!(
        workflow.run(json!({"topic": "left"})),
        workflow.run(json!({"topic": "right"})),
    );

    assert!(left.success && right.success);
    assert_ne!(left.metadata.run_id, right.metadata.run_id);
    assert_eq!(left.steps["A"], json!("first left"));
    assert_eq!(left.steps["B"], json!("second after first left"));
    assert_eq!(right.steps["A"], json!("first right"));
    assert_eq!(right.steps["B"], json!("second after first right"));
}

#[tokio::test]
async fn test_workflow_is_reusable() {
    let workflow = two_step(runtime_with(MockAiExecutor::new()));
    let first = workflow.run(json!({"topic": "x"})).await;
    let second = workflow.run(json!({"topic": "x"})).await;
    assert_eq!(first.steps, second.steps);
    assert_ne!(first.metadata.run_id, second.metadata.run_id);
}

#[tokio::test]
async fn test_cyclic_graph_never_reaches_executor() {
    let ai = MockAiExecutor::new();
    let model = Target::model("mock:echo").unwrap();
    let graph = WorkflowGraph::from_steps(
        "cyclic",
        vec![
            StepDefinition::ai("a", model.clone()).with_dependencies(["c"]),
            StepDefinition::ai("b", model.clone()).with_dependencies(["a"]),
            StepDefinition::ai("c", model).with_dependencies(["b"]),
        ],
    );

    let err = Workflow::new(graph).unwrap_err();
    assert!(err.is_graph_error());
    assert!(ai.requests().is_empty());
}

#[tokio::test]
async fn test_deserialized_graph_runs() {
    let graph: WorkflowGraph = serde_json::from_value(json!({
        "name": "from-json",
        "steps": [
            {"name": "a", "kind": "ai", "target": "mock:echo", "config": {"prompt": "hi {{input.who}}"}},
            {"name": "b", "kind": "tool", "target": "fs:read", "params": {"path": "{{steps.a}}"}, "depends_on": ["a"]}
        ]
    }))
    .unwrap();

    let runtime = Runtime::new()
        .with_config(Config::new().with_telemetry(false))
        .with_ai_executor(MockAiExecutor::new())
        .with_tool_executor(MockToolExecutor::new())
        .with_server(ToolServer::stdio("fs", "npx", ["server-fs"]));
    let result = Workflow::new(graph)
        .unwrap()
        .with_runtime(Arc::new(runtime))
        .run(json!({"who": "there"}))
        .await;

    assert!(result.success);
    assert_eq!(result.final_output, Some(json!({"path": "hi there"})));
}

#[tokio::test]
async fn test_credential_precedence() {
    let env: HashMap<String, String> =
        HashMap::from([("OPENAI_API_KEY".to_string(), "from-env".to_string())]);
    let ai = MockAiExecutor::new();

    let build = |config: Config| {
        let runtime = Runtime::new()
            .with_config(config.with_telemetry(false))
            .with_ai_executor(ai.clone())
            .with_credential_resolver(TieredCredentials::new(Arc::new(env.clone())));
        WorkflowBuilder::new("wf")
            .with_runtime(Arc::new(runtime))
            .add_step("a")
            .unwrap()
            .model("openai:gpt-4o")
            .unwrap()
            .build()
            .unwrap()
    };
    let configured = || Config::new().with_credential("openai", "from-config");

    let per_run = RunOptions::new().with_credential("openai", "from-run");
    assert!(build(configured()).run_with(json!({}), per_run).await.success);
    let credential = ai.last_request().unwrap().credential.unwrap();
    assert_eq!(credential.api_key, "from-run");
    assert_eq!(credential.source, CredentialSource::PerRun);

    assert!(build(configured()).run(json!({})).await.success);
    let credential = ai.last_request().unwrap().credential.unwrap();
    assert_eq!(credential.api_key, "from-config");
    assert_eq!(credential.source, CredentialSource::Config);

    assert!(build(Config::new()).run(json!({})).await.success);
    let credential = ai.last_request().unwrap().credential.unwrap();
    assert_eq!(credential.api_key, "from-env");
    assert_eq!(credential.source, CredentialSource::Environment);
}

#[tokio::test]
async fn test_missing_credential_names_provider_and_env_var() {
    let ai = MockAiExecutor::new();
    let runtime = Runtime::new()
        .with_config(Config::new().with_telemetry(false))
        .with_ai_executor(ai.clone())
        .with_credential_resolver(TieredCredentials::new(Arc::new(
            HashMap::<String, String>::new(),
        )));

    let result = WorkflowBuilder::new("wf")
        .with_runtime(Arc::new(runtime))
        .add_step("a")
        .unwrap()
        .model("anthropic:claude-sonnet")
        .unwrap()
        .run(json!({}))
        .await;

    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Configuration);
    assert!(error.message.contains("anthropic"));
    assert!(error.message.contains("ANTHROPIC_API_KEY"));
    assert!(ai.requests().is_empty());
}

#[tokio::test]
async fn test_pre_cancelled_run_issues_no_calls() {
    let ai = MockAiExecutor::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = two_step(runtime_with(ai.clone()))
        .run_with(json!({}), RunOptions::new().with_cancellation(token))
        .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Cancelled);
    assert_eq!(error.step_name.as_deref(), Some("A"));
    assert!(ai.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_during_step_stops_the_run() {
    let ai = MockAiExecutor::new().with_delay(Duration::from_secs(5));
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = two_step(runtime_with(ai.clone()))
        .run_with(json!({}), RunOptions::new().with_cancellation(token))
        .await;

    assert_eq!(result.error.unwrap().error_type, ErrorType::Cancelled);
    assert_eq!(ai.called_steps(), vec!["A"]);
    assert!(result.steps.is_empty());
}

#[tokio::test]
async fn test_run_timeout() {
    let ai = MockAiExecutor::new().with_delay(Duration::from_secs(5));
    let result = two_step(runtime_with(ai))
        .run_with(json!({}), RunOptions::new().with_timeout_ms(20))
        .await;

    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Timeout);
    assert_eq!(error.step_name.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_token_usage_and_tags_reach_metadata() {
    let ai = MockAiExecutor::new()
        .with_step("A", AiResponse::success("outA").with_usage(10, 5))
        .with_step("B", AiResponse::success("outB").with_usage(7, 3));
    let result = two_step(runtime_with(ai))
        .run_with(json!({}), RunOptions::new().with_metadata("tenant", "acme"))
        .await;

    assert_eq!(result.metadata.metrics.tokens_in, 17);
    assert_eq!(result.metadata.metrics.tokens_out, 8);
    assert_eq!(result.metadata.metrics.total_tokens, 25);
    assert_eq!(result.metadata.tags["tenant"], json!("acme"));
}

#[tokio::test]
async fn test_telemetry_record_enqueued_after_run() {
    let reporter = MemoryReporter::new();
    let ai = MockAiExecutor::new().with_failure("B", ErrorType::Auth, "bad key");
    let runtime = Runtime::new()
        .with_config(Config::new())
        .with_ai_executor(ai)
        .with_telemetry(reporter.clone());

    let result = two_step(Arc::new(runtime)).run(json!({"topic": "t"})).await;
    assert!(!result.success);

    let records = reporter.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.run_id, result.metadata.run_id);
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.steps.len(), 2);
    assert_eq!(record.steps[0].status, StepStatus::Success);
    assert_eq!(record.steps[1].status, StepStatus::Failed);
    assert_eq!(record.steps[1].error_type, Some(ErrorType::Auth));
}

#[tokio::test]
async fn test_telemetry_disabled_enqueues_nothing() {
    let reporter = MemoryReporter::new();
    let runtime = Runtime::new()
        .with_config(Config::new().with_telemetry(false))
        .with_ai_executor(MockAiExecutor::new())
        .with_telemetry(reporter.clone());

    assert!(two_step(Arc::new(runtime)).run(json!({})).await.success);
    assert!(reporter.records().is_empty());
}

#[tokio::test]
async fn test_missing_runtime_is_reported() {
    let result = WorkflowBuilder::new("wf")
        .add_step("a")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .run(json!({}))
        .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Configuration);
    assert!(error.step_name.is_none());
    assert_eq!(error.message, Error::NoRuntime.to_string());
}

#[tokio::test]
async fn test_unrepresentable_timeout_means_no_deadline() {
    let result = two_step(runtime_with(MockAiExecutor::new()))
        .run_with(json!({"topic": "t"}), RunOptions::new().with_timeout(Duration::MAX))
        .await;

    assert!(result.success);
    assert_eq!(result.steps.len(), 2);
}

fn read_then_summarize(tools: MockToolExecutor, ai: MockAiExecutor) -> Workflow {
    let runtime = Runtime::new()
        .with_config(Config::new().with_telemetry(false))
        .with_ai_executor(ai)
        .with_tool_executor(tools)
        .with_server(ToolServer::stdio("fs", "npx", ["server-fs"]));

    WorkflowBuilder::new("read-then-summarize")
        .with_runtime(Arc::new(runtime))
        .add_step("A")
        .unwrap()
        .tool("fs:read")
        .unwrap()
        .params(json!({"path": "notes.txt"}))
        .unwrap()
        .add_step("B")
        .unwrap()
        .model("mock:echo")
        .unwrap()
        .prompt("Summarize {{steps.A.path}}")
        .depends_on(["A"])
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_cancel_between_steps_reports_next_step() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    let tools = MockToolExecutor::new().with_handler("read", move |params| {
        canceller.cancel();
        Ok(params.clone())
    });
    let ai = MockAiExecutor::new();

    let result = read_then_summarize(tools, ai.clone())
        .run_with(json!({}), RunOptions::new().with_cancellation(token))
        .await;

    assert!(!result.success);
    assert_eq!(result.failed_step(), Some("B"));
    assert_eq!(result.error.unwrap().error_type, ErrorType::Cancelled);
    assert_eq!(result.steps.keys().collect::<Vec<_>>(), vec!["A"]);
    assert_eq!(result.steps["A"], json!({"path": "notes.txt"}));
    assert!(ai.requests().is_empty());
}

#[tokio::test]
async fn test_deadline_lapsing_between_steps_reports_next_step() {
    let tools = MockToolExecutor::new().with_handler("read", |params| {
        std::thread::sleep(Duration::from_millis(60));
        Ok(params.clone())
    });
    let ai = MockAiExecutor::new();

    let result = read_then_summarize(tools, ai.clone())
        .run_with(json!({}), RunOptions::new().with_timeout_ms(20))
        .await;

    assert!(!result.success);
    assert_eq!(result.failed_step(), Some("B"));
    assert_eq!(result.error.unwrap().error_type, ErrorType::Timeout);
    assert_eq!(result.steps.keys().collect::<Vec<_>>(), vec!["A"]);
    assert!(ai.requests().is_empty());
}
