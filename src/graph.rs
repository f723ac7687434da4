//! The workflow graph: an append-only, ordered list of step definitions.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schedule;
use crate::step::StepDefinition;
use crate::{Error, Result};

/// Webhook trigger, recorded for the cloud collaborator and never executed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Cron schedule, recorded for the cloud collaborator and never executed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// An ordered collection of steps plus workflow-wide features.
///
/// The step list is shared copy-on-write: cloning a graph is cheap, and
/// appending to or refining a clone never changes the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    name: String,
    steps: Arc<Vec<StepDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    webhook: Option<Webhook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schedule: Option<Schedule>,
}

impl WorkflowGraph {
    /// Create an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Arc::new(Vec::new()),
            webhook: None,
            schedule: None,
        }
    }

    /// Create a graph from pre-built steps without validating them.
    ///
    /// Call [`validate`](Self::validate) before scheduling.
    pub fn from_steps(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.into(),
            steps: Arc::new(steps),
            webhook: None,
            schedule: None,
        }
    }

    /// The workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Whether a step with this name has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.step(name).is_some()
    }

    /// Number of declared steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step has been declared.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The webhook trigger, if one was recorded.
    pub fn webhook(&self) -> Option<&Webhook> {
        self.webhook.as_ref()
    }

    /// The cron schedule, if one was recorded.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub(crate) fn set_webhook(&mut self, webhook: Webhook) {
        self.webhook = Some(webhook);
    }

    pub(crate) fn set_schedule(&mut self, schedule: Schedule) {
        self.schedule = Some(schedule);
    }

    /// Append a step, rejecting a name that is already declared.
    pub(crate) fn push(&mut self, step: StepDefinition) -> Result<()> {
        if self.contains(&step.name) {
            return Err(Error::DuplicateStep(step.name));
        }
        Arc::make_mut(&mut self.steps).push(step);
        Ok(())
    }

    /// Refine the most recently declared step in place.
    ///
    /// Copies the step list first if any other graph value still shares it.
    pub(crate) fn refine_last<F>(&mut self, f: F)
    where
        F: FnOnce(&mut StepDefinition),
    {
        if let Some(last) = Arc::make_mut(&mut self.steps).last_mut() {
            f(last);
        }
    }

    /// Step indices in an order where every step follows its dependencies.
    pub fn execution_order(&self) -> Result<Vec<usize>> {
        schedule::execution_order(self.steps())
    }

    /// Check the graph invariants before scheduling.
    ///
    /// Rejects empty graphs, duplicate names, dependencies on unknown steps,
    /// cycles, and dependencies on steps declared after the dependent.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::EmptyWorkflow(self.name.clone()));
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(self.steps.len());
        for step in self.steps.iter() {
            if !seen.insert(step.name.as_str()) {
                return Err(Error::DuplicateStep(step.name.clone()));
            }
        }

        for step in self.steps.iter() {
            if let Some(missing) = step.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
                return Err(Error::UnknownDependency {
                    step: step.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        self.execution_order()?;

        let mut declared: HashSet<&str> = HashSet::with_capacity(self.steps.len());
        for step in self.steps.iter() {
            if let Some(later) = step.depends_on.iter().find(|d| !declared.contains(d.as_str())) {
                return Err(Error::UnknownDependency {
                    step: step.name.clone(),
                    dependency: later.clone(),
                });
            }
            declared.insert(step.name.as_str());
        }

        Ok(())
    }
}
