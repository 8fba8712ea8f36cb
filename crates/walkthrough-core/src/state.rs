//! Per-step results accumulated during a run.

use crate::error::{VerificationFailure, WorkflowError};
use crate::path;
use crate::request::{RequestSpec, Response};
use crate::step::StepName;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one executed step.
///
/// Content steps carry no request or response and always pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// The request sent to the host, for endpoint steps.
    #[serde(rename = "requestData", default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSpec>,
    /// The host's response, for endpoint steps.
    #[serde(rename = "responseData", default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    /// Fields extracted for later steps.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Whether the step's verifier accepted the response.
    pub passed: bool,
    /// Message set by the verifier when it rejected the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepResult {
    /// Result of a content step.
    pub fn content() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    /// Returns an extracted field at a dotted path.
    pub fn data_field(&self, path: &str) -> Option<&Value> {
        path::lookup_in(&self.data, path)
    }

    /// Returns the response status, if the step made a call.
    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|response| response.status_code)
    }
}

/// Step results keyed by step name, in execution order.
///
/// Entries are only ever added. Looking up a step that has not run (or does
/// not exist) yields `None`.
///
/// # Examples
///
/// ```
/// use walkthrough_core::{StepResult, StepStateMap, StepName};
///
/// let mut state = StepStateMap::new();
/// state.record(StepName::new("Step 1"), StepResult::content())?;
///
/// assert!(state.get("Step 1").is_some_and(|r| r.passed));
/// assert!(state.get("Step 2").is_none());
///
/// // Recording the same step twice is rejected
/// assert!(state.record(StepName::new("Step 1"), StepResult::content()).is_err());
/// # Ok::<(), walkthrough_core::WorkflowError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepStateMap {
    entries: IndexMap<StepName, StepResult>,
}

impl StepStateMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the result for a step.
    ///
    /// Fails with [`WorkflowError::DuplicateStep`] if the step already has a
    /// result; existing entries are never rewritten.
    pub fn record(&mut self, name: StepName, result: StepResult) -> Result<(), WorkflowError> {
        if self.entries.contains_key(&name) {
            return Err(WorkflowError::DuplicateStep(name));
        }
        self.entries.insert(name, result);
        Ok(())
    }

    /// Returns the result for a step.
    pub fn get(&self, name: &str) -> Option<&StepResult> {
        self.entries.get(name)
    }

    /// Returns an extracted field of a step, if both exist.
    pub fn data_field(&self, name: &str, path: &str) -> Option<&Value> {
        self.get(name).and_then(|result| result.data_field(path))
    }

    /// Returns `true` if the step has a result.
    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterates over results in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&StepName, &StepResult)> {
        self.entries.iter()
    }

    /// Iterates over step names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &StepName> {
        self.entries.keys()
    }

    /// Returns the most recently recorded result.
    pub fn last(&self) -> Option<(&StepName, &StepResult)> {
        self.entries.last()
    }

    /// Returns every step whose verifier rejected its response.
    pub fn failures(&self) -> Vec<VerificationFailure> {
        self.entries
            .iter()
            .filter(|(_, result)| !result.passed)
            .map(|(name, result)| VerificationFailure {
                step_name: name.clone(),
                message: result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "no error message was set".to_string()),
            })
            .collect()
    }

    /// Returns the number of recorded results.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
