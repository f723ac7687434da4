//! Run records offered to a telemetry reporter after each run.
//!
//! The core only builds the record and calls [`TelemetryReporter::enqueue`];
//! delivery, batching and retry belong to the reporter. Enqueueing never
//! blocks and never affects the run's outcome.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ErrorType;
use crate::events::{StepEvent, TraceEntry};
use crate::result::WorkflowResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

/// One step in a [`RunRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Normalized description of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,
}

impl RunRecord {
    /// Build a record from a run's result and its event trace.
    pub fn from_run(result: &WorkflowResult, traces: &[TraceEntry]) -> Self {
        let status = match &result.error {
            None => RunStatus::Success,
            Some(e) if e.error_type == ErrorType::Cancelled => RunStatus::Cancelled,
            Some(_) => RunStatus::Failed,
        };

        let mut steps: Vec<StepRecord> = Vec::new();
        let mut started: Option<(&str, DateTime<Utc>)> = None;

        for entry in traces {
            match &entry.event {
                StepEvent::Started { step_name } => {
                    started = Some((step_name.as_str(), entry.timestamp));
                }
                StepEvent::Completed {
                    step_name, output, ..
                } => steps.push(StepRecord {
                    step_name: step_name.clone(),
                    status: StepStatus::Success,
                    started_at: started_at(started, step_name, entry.timestamp),
                    completed_at: entry.timestamp,
                    output: Some(output.clone()),
                    error_type: None,
                    error_message: None,
                }),
                StepEvent::Failed {
                    step_name,
                    error_type,
                    message,
                } => steps.push(StepRecord {
                    step_name: step_name.clone(),
                    status: StepStatus::Failed,
                    started_at: started_at(started, step_name, entry.timestamp),
                    completed_at: entry.timestamp,
                    output: None,
                    error_type: Some(*error_type),
                    error_message: Some(message.clone()),
                }),
            }
        }

        Self {
            run_id: result.metadata.run_id,
            workflow_name: result.metadata.workflow_name.clone(),
            status,
            started_at: result.metadata.started_at,
            completed_at: result.metadata.completed_at,
            steps,
            tags: result.metadata.tags.clone(),
        }
    }
}

fn started_at(
    started: Option<(&str, DateTime<Utc>)>,
    step_name: &str,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    match started {
        Some((name, at)) if name == step_name => at,
        _ => fallback,
    }
}

/// Accepts run records for delivery.
pub trait TelemetryReporter: Send + Sync {
    /// Hand over a record. Must not block.
    fn enqueue(&self, record: RunRecord);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl TelemetryReporter for NoopReporter {
    fn enqueue(&self, _record: RunRecord) {}
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    records: Arc<Mutex<Vec<RunRecord>>>,
}

impl MemoryReporter {
    /// An empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far.
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl TelemetryReporter for MemoryReporter {
    fn enqueue(&self, record: RunRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Forwards records to a background worker over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<RunRecord>,
}

impl ChannelReporter {
    /// Create a reporter and the receiver its worker drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetryReporter for ChannelReporter {
    fn enqueue(&self, record: RunRecord) {
        if self.tx.send(record).is_err() {
            tracing::debug!("telemetry worker has shut down; dropping run record");
        }
    }
}
