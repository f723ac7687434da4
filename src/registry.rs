//! Registry of externally loaded tool servers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the tool executor reaches a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum Transport {
    /// A child process speaking over stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// A remote server over HTTP.
    Http { url: String },
}

/// A registered tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServer {
    pub name: String,
    #[serde(flatten)]
    pub transport: Transport,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ToolServer {
    /// A server launched as a child process.
    pub fn stdio<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            transport: Transport::Stdio {
                command: command.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            enabled: true,
        }
    }

    /// A server reached over HTTP.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Http { url: url.into() },
            enabled: true,
        }
    }

    /// Mark the server disabled; steps targeting it fail to dispatch.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Tool servers keyed by name. Read-only during a run.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: HashMap<String, ToolServer>,
}

impl ServerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a server.
    pub fn register(&mut self, server: ToolServer) {
        self.servers.insert(server.name.clone(), server);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_server(mut self, server: ToolServer) -> Self {
        self.register(server);
        self
    }

    /// Unregister a server, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<ToolServer> {
        self.servers.remove(name)
    }

    /// Registered server names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.servers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Find an enabled server by name.
    pub fn lookup(&self, name: &str) -> Result<&ToolServer> {
        match self.servers.get(name) {
            Some(server) if server.enabled => Ok(server),
            Some(_) => Err(Error::ServerDisabled(name.to_string())),
            None => Err(Error::ServerNotFound(name.to_string())),
        }
    }
}

impl FromIterator<ToolServer> for ServerRegistry {
    fn from_iter<T: IntoIterator<Item = ToolServer>>(iter: T) -> Self {
        let mut registry = Self::new();
        for server in iter {
            registry.register(server);
        }
        registry
    }
}
