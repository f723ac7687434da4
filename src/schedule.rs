//! Topological scheduling of workflow steps.
//!
//! Depth-first traversal with three-colour marking. Steps are visited in
//! declaration order and each step's dependencies in the order they were
//! listed, so the resulting order is deterministic for a given graph.

use std::collections::HashMap;

use crate::step::StepDefinition;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Scheduler<'a> {
    steps: &'a [StepDefinition],
    index: HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    /// In-progress steps with the position of the next dependency to visit.
    stack: Vec<(usize, usize)>,
    order: Vec<usize>,
}

/// Order `steps` so that every step appears after all of its dependencies.
///
/// Returns indices into `steps`. Fails with [`Error::CircularDependency`]
/// on a cycle, or [`Error::UnknownDependency`] when a dependency names no step.
///
/// # Example
///
/// ```rust
/// use llm_dag::schedule::execution_order;
/// use llm_dag::step::{StepDefinition, Target};
///
/// let model = Target::model("openai:gpt-4o").unwrap();
/// let steps = vec![
///     StepDefinition::ai("a", model.clone()),
///     StepDefinition::ai("c", model.clone()).with_dependencies(["a", "b"]),
///     StepDefinition::ai("b", model).with_dependencies(["a"]),
/// ];
/// assert_eq!(execution_order(&steps).unwrap(), vec![0, 2, 1]);
/// ```
pub fn execution_order(steps: &[StepDefinition]) -> Result<Vec<usize>> {
    let mut scheduler = Scheduler {
        steps,
        index: steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect(),
        marks: vec![Mark::Unvisited; steps.len()],
        stack: Vec::new(),
        order: Vec::with_capacity(steps.len()),
    };

    for i in 0..steps.len() {
        scheduler.visit(i)?;
    }
    Ok(scheduler.order)
}

impl Scheduler<'_> {
    /// Depth-first visit from `root` on an explicit stack; never recurses.
    fn visit(&mut self, root: usize) -> Result<()> {
        if self.marks[root] != Mark::Unvisited {
            return Ok(());
        }
        self.enter(root);

        let steps = self.steps;
        while let Some(frame) = self.stack.last_mut() {
            let (i, next) = *frame;
            let Some(dep) = steps[i].depends_on.get(next) else {
                self.stack.pop();
                self.marks[i] = Mark::Done;
                self.order.push(i);
                continue;
            };
            frame.1 += 1;

            let Some(&d) = self.index.get(dep.as_str()) else {
                return Err(Error::UnknownDependency {
                    step: steps[i].name.clone(),
                    dependency: dep.clone(),
                });
            };
            match self.marks[d] {
                Mark::Done => {}
                Mark::InProgress => return Err(self.cycle_through(d)),
                Mark::Unvisited => self.enter(d),
            }
        }
        Ok(())
    }

    fn enter(&mut self, i: usize) {
        self.marks[i] = Mark::InProgress;
        self.stack.push((i, 0));
    }

    /// The chain of names from the first visit of `i` back to `i`.
    fn cycle_through(&self, i: usize) -> Error {
        let start = self.stack.iter().position(|&(p, _)| p == i).unwrap_or(0);
        let mut cycle: Vec<String> = self.stack[start..]
            .iter()
            .map(|&(p, _)| self.steps[p].name.clone())
            .collect();
        cycle.push(self.steps[i].name.clone());
        Error::CircularDependency { cycle }
    }
}
