//! Metrics collected over one run.
//!
//! Token counts come from the AI adapter's responses; tool steps only
//! contribute to the step counters.

use serde::{Deserialize, Serialize};

/// Aggregated metrics for a workflow run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Prompt tokens consumed across all AI steps.
    pub tokens_in: u64,
    /// Completion tokens generated across all AI steps.
    pub tokens_out: u64,
    pub total_tokens: u64,
    /// Steps that completed successfully.
    pub steps_completed: usize,
    /// Steps that failed (zero or one, since a failure stops the run).
    pub steps_failed: usize,
}

impl RunMetrics {
    /// Record token usage reported for one step.
    pub fn add_tokens(&mut self, tokens_in: u64, tokens_out: u64) {
        self.tokens_in += tokens_in;
        self.tokens_out += tokens_out;
        self.total_tokens += tokens_in + tokens_out;
    }

    /// Count a completed step.
    pub fn record_step(&mut self) {
        self.steps_completed += 1;
    }

    /// Count a failed step.
    pub fn record_failure(&mut self) {
        self.steps_failed += 1;
    }

    /// Whether any step failed.
    pub fn has_failures(&self) -> bool {
        self.steps_failed > 0
    }
}
