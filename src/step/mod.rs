//! The step model: one node in a workflow graph.
//!
//! A [`StepDefinition`] is either an AI invocation bound to a
//! `provider:model` [`Target`], or a tool invocation bound to a
//! `server:tool` target with a parameter map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod config;
pub mod target;

pub use config::{Backoff, RetryPolicy, StepConfig};
pub use target::Target;

/// What a step invokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Call a language model through the AI adapter.
    Ai {
        /// `provider:model`
        target: Target,
    },
    /// Call a tool on a registered tool server.
    Tool {
        /// `server:tool`
        target: Target,
        /// Tool arguments; string values may contain `{{...}}` placeholders.
        #[serde(default)]
        params: Map<String, Value>,
    },
}

/// One node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique within a workflow.
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub config: StepConfig,
    /// Steps that must complete first, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl StepDefinition {
    /// Create an AI step bound to `target`.
    pub fn ai(name: impl Into<String>, target: Target) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Ai { target },
            config: StepConfig::default(),
            depends_on: Vec::new(),
        }
    }

    /// Create a tool step bound to `target` with `params`.
    pub fn tool(name: impl Into<String>, target: Target, params: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Tool { target, params },
            config: StepConfig::default(),
            depends_on: Vec::new(),
        }
    }

    /// Replace the step options.
    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }

    /// Append dependencies, skipping names already listed.
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.depends_on.contains(&name) {
                self.depends_on.push(name);
            }
        }
        self
    }

    /// The bound target.
    pub fn target(&self) -> &Target {
        match &self.kind {
            StepKind::Ai { target } | StepKind::Tool { target, .. } => target,
        }
    }

    /// Whether this is an AI step.
    pub fn is_ai(&self) -> bool {
        matches!(self.kind, StepKind::Ai { .. })
    }
}
