//! Error types for workflow construction and execution.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category surfaced in [`WorkflowError`](crate::WorkflowError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Malformed graph or template, detected before the step ran.
    Validation,
    /// Missing credential, tool server or runtime.
    Configuration,
    /// The run deadline elapsed.
    Timeout,
    /// The provider rejected the call for rate limiting.
    RateLimit,
    /// The provider (or AI adapter) reported an error.
    Provider,
    /// The provider rejected the credential.
    Auth,
    /// The tool executor reported an error.
    Tool,
    /// The caller aborted the run.
    Cancelled,
    /// Anything the collaborator did not categorize.
    Unknown,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::Validation => "validation",
            ErrorType::Configuration => "configuration",
            ErrorType::Timeout => "timeout",
            ErrorType::RateLimit => "rate_limit",
            ErrorType::Provider => "provider",
            ErrorType::Auth => "auth",
            ErrorType::Tool => "tool",
            ErrorType::Cancelled => "cancelled",
            ErrorType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The main error type for workflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A target string was not of the form `namespace:name`.
    #[error("Invalid target '{target}': expected '{expected}'")]
    InvalidTarget {
        /// The offending target string.
        target: String,
        /// The expected shape, e.g. `provider:model`.
        expected: &'static str,
    },

    /// Tool parameters were not a JSON object.
    #[error("Tool step '{step}' params must be a JSON object, got {found}")]
    InvalidParams {
        /// The tool step.
        step: String,
        /// JSON type that was supplied instead.
        found: &'static str,
    },

    /// A step name was declared twice.
    #[error("Duplicate step name '{0}'")]
    DuplicateStep(String),

    /// A dependency names a step that was not declared before the dependent.
    #[error("Step '{step}' depends on '{dependency}', which is not declared before it")]
    UnknownDependency {
        /// The dependent step.
        step: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Circular dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// Step names from the point the cycle closes, ending on the repeated name.
        cycle: Vec<String>,
    },

    /// The workflow has no steps to run.
    #[error("Workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    /// No credential tier supplied a key for the provider.
    #[error("No API key configured for provider '{provider}' (set {env_var} or pass a per-run credential)")]
    MissingCredential {
        /// Provider id.
        provider: String,
        /// The environment variable consulted last.
        env_var: String,
    },

    /// The tool server is not registered.
    #[error("Tool server '{0}' not found")]
    ServerNotFound(String),

    /// The tool server is registered but disabled.
    #[error("Tool server '{0}' is disabled")]
    ServerDisabled(String),

    /// No runtime was injected and no global runtime is installed.
    #[error("No runtime configured; call runtime::set_global or Workflow::with_runtime")]
    NoRuntime,

    /// A template placeholder could not be resolved.
    #[error("Template error: {0}")]
    Template(String),

    /// A collaborator reported a step failure.
    #[error("Step '{step_name}' failed ({error_type}): {message}")]
    Step {
        /// The failing step.
        step_name: String,
        /// Category reported by the collaborator.
        error_type: ErrorType,
        /// Collaborator message.
        message: String,
    },

    /// The run was cancelled by the caller.
    #[error("Workflow run was cancelled")]
    Cancelled,

    /// The run deadline elapsed.
    #[error("Workflow run timed out after {0} ms")]
    Timeout(u64),

    /// A generic error with a message.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// The coarse category reported to callers.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Error::InvalidTarget { .. }
            | Error::InvalidParams { .. }
            | Error::DuplicateStep(_)
            | Error::UnknownDependency { .. }
            | Error::CircularDependency { .. }
            | Error::EmptyWorkflow(_)
            | Error::Template(_) => ErrorType::Validation,
            Error::MissingCredential { .. }
            | Error::ServerNotFound(_)
            | Error::ServerDisabled(_)
            | Error::NoRuntime => ErrorType::Configuration,
            Error::Step { error_type, .. } => *error_type,
            Error::Cancelled => ErrorType::Cancelled,
            Error::Timeout(_) => ErrorType::Timeout,
            Error::Message(_) => ErrorType::Unknown,
        }
    }

    /// Whether this error describes an invalid graph, detected before any step runs.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidTarget { .. }
                | Error::InvalidParams { .. }
                | Error::DuplicateStep(_)
                | Error::UnknownDependency { .. }
                | Error::CircularDependency { .. }
                | Error::EmptyWorkflow(_)
        )
    }

    /// The message reported in a [`WorkflowError`](crate::WorkflowError).
    ///
    /// Step failures report the collaborator's own message rather than the
    /// decorated `Display` form.
    pub fn report_message(&self) -> String {
        match self {
            Error::Step { message, .. } if !message.is_empty() => message.clone(),
            Error::Step { .. } => "Step failed without a message".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Message(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Message(msg.to_string())
    }
}

/// A specialized `Result` type for workflow operations.
pub type Result<T> = std::result::Result<T, Error>;
