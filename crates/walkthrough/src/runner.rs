//! Sequential execution of workflow definitions.

use crate::host::PortalHost;
use crate::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkthrough_core::{
    Config, EndpointStep, ErrorSlot, RequestSpec, Response, RetryPolicy, Scope, StepDefinition,
    StepKind, StepName, StepResult, StepStateMap, VerificationFailure, WorkflowError,
};

/// How a run reacts to failures.
///
/// # Examples
///
/// ```
/// use walkthrough::{RetryPolicy, RunPolicy};
/// use std::time::Duration;
///
/// let policy = RunPolicy::default()
///     .with_halt_on_failure(false)
///     .with_transport_retry(RetryPolicy::fixed(2, Duration::from_millis(50)))
///     .with_step_timeout(Duration::from_secs(10));
/// assert!(!policy.halt_on_failure);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicy {
    /// Stop after the first step whose verifier rejects the response.
    pub halt_on_failure: bool,
    /// Keep the response and extracted data of failed steps visible to later steps.
    pub expose_failed_data: bool,
    /// Retries for endpoint calls that fail in transit or time out.
    pub transport_retry: RetryPolicy,
    /// Upper bound on a single endpoint call.
    pub step_timeout: Option<Duration>,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            halt_on_failure: true,
            expose_failed_data: true,
            transport_retry: RetryPolicy::None,
            step_timeout: None,
        }
    }
}

impl RunPolicy {
    /// Sets whether a failed verification stops the run.
    pub fn with_halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    /// Sets whether failed steps keep their response and data.
    pub fn with_expose_failed_data(mut self, expose: bool) -> Self {
        self.expose_failed_data = expose;
        self
    }

    /// Sets the transport retry policy.
    pub fn with_transport_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport_retry = retry;
        self
    }

    /// Bounds every endpoint call.
    pub fn with_step_timeout(mut self, limit: Duration) -> Self {
        self.step_timeout = Some(limit);
        self
    }
}

/// The outcome of a run that was not aborted by an error.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    state: StepStateMap,
    config: Config,
    halted_at: Option<StepName>,
}

impl WorkflowRun {
    /// Results of every step that ran, in execution order.
    pub fn state(&self) -> &StepStateMap {
        &self.state
    }

    /// The config as left by the last step that ran.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The step whose failed verification stopped the run.
    pub fn halted_at(&self) -> Option<&StepName> {
        self.halted_at.as_ref()
    }

    /// Returns `true` if every step ran.
    pub fn is_complete(&self) -> bool {
        self.halted_at.is_none()
    }

    /// Returns `true` if every step that ran passed verification.
    pub fn all_passed(&self) -> bool {
        self.state.iter().all(|(_, result)| result.passed)
    }

    /// Verification failures in execution order.
    pub fn failures(&self) -> Vec<VerificationFailure> {
        self.state.failures()
    }

    /// Consumes the run and returns the step state map.
    pub fn into_state(self) -> StepStateMap {
        self.state
    }

    /// Consumes the run and returns the state map and final config.
    pub fn into_parts(self) -> (StepStateMap, Config) {
        (self.state, self.config)
    }

    /// Returns the state map, or the first verification failure as an error.
    pub fn ensure_passed(self) -> Result<StepStateMap, WorkflowError> {
        match self.state.failures().into_iter().next() {
            Some(failure) => Err(failure.into()),
            None => Ok(self.state),
        }
    }
}

/// Runs workflow definitions against a [`PortalHost`].
///
/// A runner holds no per-run state, so one runner can execute many
/// workflows, including concurrently.
#[derive(Clone)]
pub struct WorkflowRunner {
    host: Arc<dyn PortalHost>,
    policy: RunPolicy,
}

impl fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl WorkflowRunner {
    /// Creates a runner with the default policy.
    pub fn new(host: impl PortalHost + 'static) -> Self {
        Self::from_shared(Arc::new(host))
    }

    /// Creates a runner over an already shared host.
    pub fn from_shared(host: Arc<dyn PortalHost>) -> Self {
        Self {
            host,
            policy: RunPolicy::default(),
        }
    }

    /// Replaces the run policy.
    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the run policy.
    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// Runs the workflow from an empty config.
    pub async fn run(&self, definition: &WorkflowDefinition) -> Result<WorkflowRun, WorkflowError> {
        self.run_with(definition, Config::new(), &CancellationToken::new())
            .await
    }

    /// Runs the workflow from `initial`, checking `cancel` before each step.
    ///
    /// Returns `Err` only when the run is aborted: a config updater failed,
    /// the host could not resolve or reach an endpoint, or the run was
    /// cancelled. Failed verifications are recorded in the returned state.
    pub async fn run_with(
        &self,
        definition: &WorkflowDefinition,
        initial: Config,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRun, WorkflowError> {
        let mut config = initial;
        let mut state = StepStateMap::new();
        let mut halted_at = None;

        info!(
            "Starting workflow '{}' with {} steps",
            definition.id(),
            definition.step_count()
        );

        for step in definition.steps() {
            if cancel.is_cancelled() {
                warn!(
                    "Workflow '{}' cancelled before step '{}'",
                    definition.id(),
                    step.name()
                );
                return Err(WorkflowError::Cancelled {
                    step_name: step.name().clone(),
                });
            }

            debug!("Running step '{}' ({})", step.name(), step.label());
            let result = self.execute_step(step, &mut config, &state, cancel).await?;
            let passed = result.passed;
            let message = result.error_message.clone();
            state.record(step.name().clone(), result)?;

            if passed {
                info!("Step '{}' completed successfully", step.name());
                continue;
            }

            warn!(
                "Step '{}' failed verification: {}",
                step.name(),
                message.as_deref().unwrap_or("no error message was set")
            );
            if self.policy.halt_on_failure {
                halted_at = Some(step.name().clone());
                break;
            }
        }

        match &halted_at {
            Some(name) => warn!("Workflow '{}' halted at step '{}'", definition.id(), name),
            None => info!(
                "Workflow '{}' finished after {} steps",
                definition.id(),
                state.len()
            ),
        }

        Ok(WorkflowRun {
            state,
            config,
            halted_at,
        })
    }

    async fn execute_step(
        &self,
        step: &StepDefinition,
        config: &mut Config,
        state: &StepStateMap,
        cancel: &CancellationToken,
    ) -> Result<StepResult, WorkflowError> {
        if let Some(updater) = step.config_updater() {
            let current = std::mem::take(config);
            *config = updater.update(current, state).await.map_err(|source| {
                WorkflowError::ConfigUpdate {
                    step_name: step.name().clone(),
                    source,
                }
            })?;
            debug!("Step '{}' updated the config", step.name());
        }

        match step.kind() {
            StepKind::Content(content) => {
                self.host.display_content(content.text()).await;
                Ok(StepResult::content())
            }
            StepKind::Endpoint(endpoint) => {
                self.execute_endpoint(step, endpoint, config, state, cancel)
                    .await
            }
        }
    }

    async fn execute_endpoint(
        &self,
        step: &StepDefinition,
        endpoint: &EndpointStep,
        config: &Config,
        state: &StepStateMap,
        cancel: &CancellationToken,
    ) -> Result<StepResult, WorkflowError> {
        let step_name = step.name();
        let scope = Scope::new(config, state);
        let request = endpoint.request(&scope).with_label(step.label());
        debug!(
            "Step '{}' calling '{}'",
            step_name, request.endpoint_permalink
        );

        let response = self
            .call_with_retry(step_name, &request, config, cancel)
            .await?;
        debug!(
            "Step '{}' received status {}",
            step_name, response.status_code
        );

        let mut errors = ErrorSlot::new();
        let passed = endpoint.verifier().verify(&response, &mut errors);
        let error_message = if passed { None } else { errors.into_message() };

        let (data, response) = if passed || self.policy.expose_failed_data {
            (endpoint.extract(&response, &scope), Some(response))
        } else {
            (Map::new(), None)
        };

        Ok(StepResult {
            request: Some(request),
            response,
            data,
            passed,
            error_message,
        })
    }

    async fn call_with_retry(
        &self,
        step_name: &StepName,
        request: &RequestSpec,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Response, WorkflowError> {
        let retry = &self.policy.transport_retry;
        let max_retries = retry.max_retries();
        let mut attempt = 0;

        loop {
            let error = match self.call_once(step_name, request, config, cancel).await {
                Ok(response) => return Ok(response),
                Err(error @ WorkflowError::EndpointResolution { .. }) => return Err(error),
                Err(error) => error,
            };

            if attempt >= max_retries {
                warn!(
                    "Step '{}' failed after {} retries: {}",
                    step_name, attempt, error
                );
                return Err(error);
            }

            info!(
                "Step '{}' call failed, retrying ({}/{}): {}",
                step_name,
                attempt + 1,
                max_retries,
                error
            );
            if let Some(delay) = retry.delay_for_attempt(attempt) {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(WorkflowError::Cancelled {
                            step_name: step_name.clone(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;
        }
    }

    async fn call_once(
        &self,
        step_name: &StepName,
        request: &RequestSpec,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Response, WorkflowError> {
        let call = self.host.execute_endpoint(request, config, cancel);
        let result = match self.policy.step_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(WorkflowError::Timeout {
                        step_name: step_name.clone(),
                    })
                }
            },
            None => call.await,
        };
        result.map_err(|error| WorkflowError::from_endpoint(step_name.clone(), error))
    }
}
