//! Core types for guided API walkthrough workflows.
//!
//! This crate does not depend on an async runtime. Hosts and step authors depend
//! on it; the sequential runner lives in the `walkthrough` crate.
//!
//! # Core Types
//!
//! - [`StepDefinition`] - A named content or endpoint step
//! - [`StepStateMap`] / [`StepResult`] - Results visible to later steps
//! - [`Config`] - Auth material and endpoint parameters threaded through a run
//! - [`Expression`] - References to config, prior steps and the current response
//! - [`WorkflowError`] - Error types for workflow execution
//!
//! # Capability Traits
//!
//! - [`ConfigUpdater`] - Compute the next config before a step runs
//! - [`ArgsBuilder`] - Build request arguments
//! - [`Verifier`] - Classify a response as passed or failed

mod args;
mod config;
mod error;
mod expr;
pub mod path;
mod request;
mod retry;
mod state;
mod step;
mod traits;
mod verify;

pub use args::{ArgTemplate, ArgValue};
pub use config::Config;
pub use error::{
    ConfigUpdateError, EndpointError, ExpressionError, VerificationFailure, WorkflowError,
};
pub use expr::{Expression, Scope};
pub use request::{ParamLocation, RequestArgs, RequestSpec, Response};
pub use retry::{RetryPolicy, RetryPolicyError};
pub use state::{StepResult, StepStateMap};
pub use step::{ContentStep, EndpointStep, StepDefinition, StepKind, StepName};
pub use traits::{ArgsBuilder, ConfigUpdater};
pub use verify::{ErrorSlot, StatusVerifier, Verifier, GENERIC_FAILURE_MESSAGE};
