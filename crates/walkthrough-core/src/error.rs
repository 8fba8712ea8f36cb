//! Walkthrough error types.

use crate::step::StepName;
use thiserror::Error;

/// A config updater could not produce a new config.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdateError {
    /// A nested field the updater depends on is absent.
    #[error("missing config field: {0}")]
    MissingField(String),

    /// The updater rejected the current config.
    #[error("{0}")]
    Invalid(String),
}

/// Failure reported by the host's endpoint executor.
///
/// Both variants are distinct from a call that completes with a non-2xx
/// status; those reach the step's verifier as ordinary responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The permalink does not match any documented endpoint.
    #[error("endpoint '{permalink}' could not be resolved: {details}")]
    Resolution {
        /// The permalink that failed to resolve.
        permalink: String,
        /// Details from the host.
        details: String,
    },

    /// The call failed in transit (network, TLS, host timeout).
    #[error("transport error: {0}")]
    Transport(String),
}

/// A runtime expression could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression does not start with a known prefix.
    #[error("unknown expression: {0}")]
    UnknownPrefix(String),

    /// `$steps.` was followed by an empty step name.
    #[error("expression has an empty step name: {0}")]
    EmptyStepName(String),

    /// A `$steps.` expression names neither outputs, request nor response.
    #[error("expression must reference outputs, request or response: {0}")]
    MissingSection(String),
}

/// A step's verifier rejected the response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Verification failed in step '{step_name}': {message}")]
pub struct VerificationFailure {
    /// The step whose verifier returned `false`.
    pub step_name: StepName,
    /// The message passed to the error slot, or a placeholder when none was set.
    pub message: String,
}

/// Errors that can occur during workflow execution.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A step's config updater failed.
    #[error("Config update failed in step '{step_name}': {source}")]
    ConfigUpdate {
        /// The step whose updater failed.
        step_name: StepName,
        /// The updater's error.
        source: ConfigUpdateError,
    },

    /// The host could not resolve a step's endpoint permalink.
    #[error("Endpoint '{permalink}' could not be resolved in step '{step_name}': {details}")]
    EndpointResolution {
        /// The step that made the call.
        step_name: StepName,
        /// The unresolved permalink.
        permalink: String,
        /// Details from the host.
        details: String,
    },

    /// The endpoint call failed in transit after all retry attempts.
    #[error("Transport failed in step '{step_name}': {details}")]
    Transport {
        /// The step that made the call.
        step_name: StepName,
        /// Details from the host.
        details: String,
    },

    /// The endpoint call exceeded the per-step timeout after all retry attempts.
    #[error("Timeout occurred in step: {step_name}")]
    Timeout {
        /// The step that timed out.
        step_name: StepName,
    },

    /// The run was cancelled before or while the named step was starting.
    #[error("Workflow cancelled at step: {step_name}")]
    Cancelled {
        /// The step that did not run.
        step_name: StepName,
    },

    /// A recorded verification failure, surfaced on request.
    #[error(transparent)]
    Verification(#[from] VerificationFailure),

    /// Two steps share a name, or a result was recorded twice.
    #[error("Duplicate step name: {0}")]
    DuplicateStep(StepName),

    /// The workflow definition is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),
}

impl WorkflowError {
    /// Wraps an endpoint executor failure with the step that caused it.
    pub fn from_endpoint(step_name: StepName, error: EndpointError) -> Self {
        match error {
            EndpointError::Resolution { permalink, details } => WorkflowError::EndpointResolution {
                step_name,
                permalink,
                details,
            },
            EndpointError::Transport(details) => WorkflowError::Transport { step_name, details },
        }
    }

    /// Returns the step this error is attributed to, if any.
    pub fn step_name(&self) -> Option<&StepName> {
        match self {
            WorkflowError::ConfigUpdate { step_name, .. }
            | WorkflowError::EndpointResolution { step_name, .. }
            | WorkflowError::Transport { step_name, .. }
            | WorkflowError::Timeout { step_name }
            | WorkflowError::Cancelled { step_name }
            | WorkflowError::DuplicateStep(step_name) => Some(step_name),
            WorkflowError::Verification(failure) => Some(&failure.step_name),
            WorkflowError::Configuration(_) => None,
        }
    }
}
