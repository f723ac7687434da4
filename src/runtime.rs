//! The collaborators a workflow runs against.
//!
//! A [`Runtime`] bundles the configuration, the AI and tool executors, the
//! tool-server registry, the credential resolver and the telemetry
//! reporter. Workflows take one explicitly; [`set_global`] installs a
//! process-wide default for callers that do not.

use std::sync::{Arc, OnceLock, RwLock};

use crate::config::{self, Config};
use crate::credentials::{CredentialResolver, TieredCredentials};
use crate::executor::{AiExecutor, ToolExecutor, Unconfigured};
use crate::registry::{ServerRegistry, ToolServer};
use crate::telemetry::{NoopReporter, TelemetryReporter};

#[derive(Debug, Clone)]
enum ConfigSource {
    /// Read the process-wide config at each lookup.
    Global,
    Fixed(Arc<Config>),
}

/// Configuration plus collaborators.
///
/// # Example
///
/// ```rust
/// use llm_dag::{Config, Runtime};
/// use llm_dag::mock::{MockAiExecutor, MockToolExecutor};
/// use llm_dag::registry::ToolServer;
///
/// let runtime = Runtime::new()
///     .with_config(Config::new().with_credential("openai", "sk-test"))
///     .with_ai_executor(MockAiExecutor::new())
///     .with_tool_executor(MockToolExecutor::new())
///     .with_server(ToolServer::http("crm", "http://localhost:9000/mcp"));
/// assert!(runtime.servers().lookup("crm").is_ok());
/// ```
#[derive(Clone)]
pub struct Runtime {
    config: ConfigSource,
    ai: Arc<dyn AiExecutor>,
    tools: Arc<dyn ToolExecutor>,
    servers: ServerRegistry,
    credentials: Arc<dyn CredentialResolver>,
    telemetry: Arc<dyn TelemetryReporter>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime reading the process-wide config, with no executors,
    /// no tool servers and telemetry discarded.
    pub fn new() -> Self {
        Self {
            config: ConfigSource::Global,
            ai: Arc::new(Unconfigured),
            tools: Arc::new(Unconfigured),
            servers: ServerRegistry::new(),
            credentials: Arc::new(TieredCredentials::default()),
            telemetry: Arc::new(NoopReporter),
        }
    }

    /// Use `config` instead of the process-wide configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = ConfigSource::Fixed(Arc::new(config));
        self
    }

    /// Use `executor` for AI steps.
    pub fn with_ai_executor<E: AiExecutor + 'static>(mut self, executor: E) -> Self {
        self.ai = Arc::new(executor);
        self
    }

    /// Use `executor` for tool steps.
    pub fn with_tool_executor<E: ToolExecutor + 'static>(mut self, executor: E) -> Self {
        self.tools = Arc::new(executor);
        self
    }

    /// Replace the tool-server registry.
    pub fn with_servers(mut self, servers: ServerRegistry) -> Self {
        self.servers = servers;
        self
    }

    /// Register one tool server.
    pub fn with_server(mut self, server: ToolServer) -> Self {
        self.servers.register(server);
        self
    }

    /// Replace the three-tier credential resolver.
    pub fn with_credential_resolver<R: CredentialResolver + 'static>(
        mut self,
        resolver: R,
    ) -> Self {
        self.credentials = Arc::new(resolver);
        self
    }

    /// Hand run records to `reporter`.
    pub fn with_telemetry<T: TelemetryReporter + 'static>(mut self, reporter: T) -> Self {
        self.telemetry = Arc::new(reporter);
        self
    }

    /// The configuration as of now.
    pub fn config(&self) -> Config {
        match &self.config {
            ConfigSource::Global => config::snapshot(),
            ConfigSource::Fixed(config) => Config::clone(config),
        }
    }

    /// The AI executor.
    pub fn ai_executor(&self) -> &dyn AiExecutor {
        self.ai.as_ref()
    }

    /// The tool executor.
    pub fn tool_executor(&self) -> &dyn ToolExecutor {
        self.tools.as_ref()
    }

    /// Registered tool servers.
    pub fn servers(&self) -> &ServerRegistry {
        &self.servers
    }

    /// The credential resolver.
    pub fn credentials(&self) -> &dyn CredentialResolver {
        self.credentials.as_ref()
    }

    /// The telemetry reporter.
    pub fn telemetry(&self) -> &dyn TelemetryReporter {
        self.telemetry.as_ref()
    }
}

fn global_slot() -> &'static RwLock<Option<Arc<Runtime>>> {
    static GLOBAL: OnceLock<RwLock<Option<Arc<Runtime>>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(None))
}

/// Install the process-wide default runtime.
pub fn set_global(runtime: Runtime) {
    *global_slot().write().unwrap() = Some(Arc::new(runtime));
}

/// The process-wide default runtime, if one is installed.
pub fn global() -> Option<Arc<Runtime>> {
    global_slot().read().unwrap().clone()
}
