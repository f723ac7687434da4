//! Colon-delimited step targets (`provider:model`, `server:tool`).

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Expected shape of an AI target.
pub const MODEL_TARGET: &str = "provider:model";
/// Expected shape of a tool target.
pub const TOOL_TARGET: &str = "server:tool";

/// A parsed `namespace:name` target.
///
/// For AI steps the namespace is the provider id and the name is the model;
/// for tool steps they are the server and the tool.
///
/// # Example
///
/// ```rust
/// use llm_dag::step::Target;
///
/// let t = Target::model("openai:gpt-4o").unwrap();
/// assert_eq!(t.namespace(), "openai");
/// assert_eq!(t.name(), "gpt-4o");
/// assert!(Target::model("openai").is_err());
/// assert!(Target::model("a:b:c").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    namespace: String,
    name: String,
}

impl Target {
    /// Parse a `provider:model` target.
    pub fn model(target: &str) -> Result<Self> {
        Self::parse(target, MODEL_TARGET)
    }

    /// Parse a `server:tool` target.
    pub fn tool(target: &str) -> Result<Self> {
        Self::parse(target, TOOL_TARGET)
    }

    /// Split `target` on its single `:` separator.
    ///
    /// Zero or several separators, or an empty side, are rejected.
    pub fn parse(target: &str, expected: &'static str) -> Result<Self> {
        let invalid = || Error::InvalidTarget {
            target: target.to_string(),
            expected,
        };

        let mut parts = target.split(':');
        let (Some(namespace), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        let namespace = namespace.trim();
        let name = name.trim();
        if namespace.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Provider id or server name.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Model id or tool name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl TryFrom<String> for Target {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value, "namespace:name")
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}
