//! Process-wide configuration: provider credentials and runtime switches.
//!
//! Core logic receives a [`Config`] explicitly (through a
//! [`Runtime`](crate::Runtime)). The process-wide instance behind
//! [`configure`] and [`snapshot`] only exists for simple callers.

use std::collections::{HashMap, HashSet};
use std::sync::{OnceLock, RwLock};

/// Providers that run locally and never need an API key.
pub const DEFAULT_KEYLESS_PROVIDERS: &[&str] = &["ollama", "local", "mock"];

/// Credentials and switches shared by every run.
#[derive(Debug, Clone)]
pub struct Config {
    /// API keys keyed by provider id.
    pub credentials: HashMap<String, String>,
    /// Base URL overrides keyed by provider id.
    pub base_urls: HashMap<String, String>,
    /// Providers that do not require credentials.
    pub keyless_providers: HashSet<String>,
    /// Whether run records are handed to the telemetry reporter.
    pub telemetry_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: HashMap::new(),
            base_urls: HashMap::new(),
            keyless_providers: DEFAULT_KEYLESS_PROVIDERS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            telemetry_enabled: true,
        }
    }
}

impl Config {
    /// Create a config with the default keyless providers and telemetry enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key for a provider.
    pub fn with_credential(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials.insert(provider.into(), key.into());
        self
    }

    /// Override the base URL for a provider.
    pub fn with_base_url(mut self, provider: impl Into<String>, url: impl Into<String>) -> Self {
        self.base_urls.insert(provider.into(), url.into());
        self
    }

    /// Mark a provider as not requiring credentials.
    pub fn with_keyless_provider(mut self, provider: impl Into<String>) -> Self {
        self.keyless_providers.insert(provider.into());
        self
    }

    /// Enable or disable telemetry reporting.
    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    /// Whether `provider` runs without credentials.
    pub fn is_keyless(&self, provider: &str) -> bool {
        self.keyless_providers.contains(provider)
    }

    /// The base URL override for `provider`, if any.
    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.base_urls.get(provider).map(String::as_str)
    }
}

/// Conventional environment variable holding a provider's API key.
///
/// ```rust
/// use llm_dag::config::env_var_for;
///
/// assert_eq!(env_var_for("openai"), "OPENAI_API_KEY");
/// assert_eq!(env_var_for("azure-openai"), "AZURE_OPENAI_API_KEY");
/// ```
pub fn env_var_for(provider: &str) -> String {
    let stem: String = provider
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{stem}_API_KEY")
}

/// A source of environment variables.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

fn global() -> &'static RwLock<Config> {
    static GLOBAL: OnceLock<RwLock<Config>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Config::default()))
}

/// Replace the process-wide configuration.
pub fn configure(config: Config) {
    let mut guard = global().write().unwrap();
    *guard = config;
}

/// Update the process-wide configuration in place.
pub fn update<F>(f: F)
where
    F: FnOnce(&mut Config),
{
    let mut guard = global().write().unwrap();
    f(&mut guard);
}

/// A copy of the process-wide configuration as it is right now.
pub fn snapshot() -> Config {
    global().read().unwrap().clone()
}
