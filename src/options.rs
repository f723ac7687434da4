//! Per-run options.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Options for one run.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use llm_dag::RunOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let cancel = CancellationToken::new();
/// let options = RunOptions::new()
///     .with_credential("openai", "sk-per-run")
///     .with_timeout(Duration::from_secs(30))
///     .with_cancellation(cancel.clone())
///     .with_metadata("ticket", "OPS-12");
/// assert_eq!(options.timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// API keys keyed by provider id; highest credential tier.
    pub credentials: HashMap<String, String>,
    /// Bound on the whole run.
    pub timeout: Option<Duration>,
    /// Cancels the run when triggered.
    pub cancel: Option<CancellationToken>,
    /// Tags copied into the result metadata and the telemetry record.
    pub metadata: Map<String, Value>,
}

impl RunOptions {
    /// Default options: no overrides, no timeout, no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the API key for `provider` for this run only.
    pub fn with_credential(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials.insert(provider.into(), key.into());
        self
    }

    /// Bound the whole run by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the whole run by `timeout_ms` milliseconds.
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    /// Abort the run when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Tag the run.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
