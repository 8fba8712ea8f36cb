//! Workflow definitions.

use std::collections::HashSet;
use std::fmt;
use walkthrough_core::{EndpointStep, StepDefinition, StepName, WorkflowError};

/// An ordered set of uniquely named steps.
///
/// Insertion order is execution order.
#[derive(Clone)]
pub struct WorkflowDefinition {
    id: String,
    steps: Vec<StepDefinition>,
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .finish()
    }
}

impl WorkflowDefinition {
    /// Creates a new workflow builder.
    pub fn builder(id: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(id)
    }

    /// Returns the workflow identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Returns a step by name.
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.name().as_str() == name)
    }

    /// Returns the position of a step in execution order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name().as_str() == name)
    }

    /// Returns an iterator over step names in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.steps.iter().map(StepDefinition::name)
    }

    /// Returns `true` if a step with the given name exists.
    pub fn has_step(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Builder for constructing [`WorkflowDefinition`] instances.
#[derive(Debug)]
pub struct WorkflowBuilder {
    id: String,
    steps: Vec<StepDefinition>,
}

impl WorkflowBuilder {
    /// Creates an empty builder.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn add_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a content step.
    pub fn content(
        self,
        name: impl Into<StepName>,
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.add_step(StepDefinition::content(name, label, text))
    }

    /// Appends an endpoint step without a config updater.
    pub fn endpoint(
        self,
        name: impl Into<StepName>,
        label: impl Into<String>,
        endpoint: EndpointStep,
    ) -> Self {
        self.add_step(StepDefinition::endpoint(name, label, endpoint))
    }

    /// Builds the workflow.
    ///
    /// Fails if there are no steps or if two steps share a name.
    pub fn build(self) -> Result<WorkflowDefinition, WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::Configuration(
                "Workflow must contain at least one step".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name().as_str()) {
                return Err(WorkflowError::DuplicateStep(step.name().clone()));
            }
        }

        Ok(WorkflowDefinition {
            id: self.id,
            steps: self.steps,
        })
    }
}
