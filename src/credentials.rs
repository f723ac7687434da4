//! Provider credential resolution.
//!
//! Keys are looked up in three tiers, first match wins: the per-run
//! overrides, then the [`Config`], then the conventional environment
//! variable (see [`env_var_for`]).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{env_var_for, Config, Environment, ProcessEnv};
use crate::{Error, Result};

/// Where a credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    PerRun,
    Config,
    Environment,
}

/// A resolved provider API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub provider: String,
    pub api_key: String,
    pub source: CredentialSource,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Everything a resolver may consult for one lookup.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    pub provider: &'a str,
    pub overrides: &'a HashMap<String, String>,
    pub config: &'a Config,
}

/// Resolves a provider's credential, or `None` when no source has one.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, request: CredentialRequest<'_>) -> Option<Credential>;
}

/// The default three-tier resolver.
#[derive(Clone)]
pub struct TieredCredentials {
    env: Arc<dyn Environment>,
}

impl Default for TieredCredentials {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl TieredCredentials {
    /// Create a resolver reading its last tier from `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }
}

impl CredentialResolver for TieredCredentials {
    fn resolve(&self, request: CredentialRequest<'_>) -> Option<Credential> {
        let found = |api_key: String, source| Credential {
            provider: request.provider.to_string(),
            api_key,
            source,
        };

        if let Some(key) = request.overrides.get(request.provider) {
            return Some(found(key.clone(), CredentialSource::PerRun));
        }
        if let Some(key) = request.config.credentials.get(request.provider) {
            return Some(found(key.clone(), CredentialSource::Config));
        }
        self.env
            .var(&env_var_for(request.provider))
            .map(|key| found(key, CredentialSource::Environment))
    }
}

/// Resolve a credential, failing when the provider needs one and none is found.
///
/// Keyless providers resolve to `Ok(None)` when nothing is configured.
pub fn require(
    resolver: &dyn CredentialResolver,
    request: CredentialRequest<'_>,
) -> Result<Option<Credential>> {
    match resolver.resolve(request) {
        Some(credential) => Ok(Some(credential)),
        None if request.config.is_keyless(request.provider) => Ok(None),
        None => Err(Error::MissingCredential {
            provider: request.provider.to_string(),
            env_var: env_var_for(request.provider),
        }),
    }
}
