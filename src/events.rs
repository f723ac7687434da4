//! Structured step events recorded during a run.
//!
//! The trace of events is what the telemetry record is derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorType;

/// Events emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum StepEvent {
    /// A step was handed to its executor.
    Started {
        step_name: String,
    },
    /// A step finished successfully.
    Completed {
        step_name: String,
        /// Duration of execution in milliseconds.
        duration_ms: u64,
        output: Value,
    },
    /// A step failed; the run stops here.
    Failed {
        step_name: String,
        error_type: ErrorType,
        message: String,
    },
}

impl StepEvent {
    /// Name of the step the event belongs to.
    pub fn step_name(&self) -> &str {
        match self {
            StepEvent::Started { step_name }
            | StepEvent::Completed { step_name, .. }
            | StepEvent::Failed { step_name, .. } => step_name,
        }
    }
}

/// A timestamped trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StepEvent,
}

impl TraceEntry {
    /// Create a new trace entry with the current timestamp.
    #[must_use]
    pub fn new(event: StepEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
