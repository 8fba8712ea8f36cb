//! Capability traits a step can carry.

use crate::config::Config;
use crate::error::ConfigUpdateError;
use crate::expr::Scope;
use crate::request::RequestArgs;
use crate::state::StepStateMap;
use async_trait::async_trait;

/// Computes the next config from the current one before a step runs.
///
/// The updater receives the full current config, including everything
/// earlier steps set, and returns the replacement. Closures with the
/// signature `Fn(Config, &StepStateMap) -> Result<Config, ConfigUpdateError>`
/// implement this trait.
///
/// # Examples
///
/// ```
/// use walkthrough_core::{Config, ConfigUpdater, ConfigUpdateError, StepStateMap};
/// use async_trait::async_trait;
///
/// struct CopySessionToken;
///
/// #[async_trait]
/// impl ConfigUpdater for CopySessionToken {
///     async fn update(
///         &self,
///         current: Config,
///         state: &StepStateMap,
///     ) -> Result<Config, ConfigUpdateError> {
///         let token = state
///             .data_field("Step 2", "sessionToken")
///             .cloned()
///             .unwrap_or_default();
///         Ok(current.with_auth("bearerAuth.AccessToken", token))
///     }
/// }
/// ```
#[async_trait]
pub trait ConfigUpdater: Send + Sync {
    /// Returns the config the rest of the run should use.
    async fn update(
        &self,
        current: Config,
        state: &StepStateMap,
    ) -> Result<Config, ConfigUpdateError>;
}

#[async_trait]
impl<F> ConfigUpdater for F
where
    F: Fn(Config, &StepStateMap) -> Result<Config, ConfigUpdateError> + Send + Sync,
{
    async fn update(
        &self,
        current: Config,
        state: &StepStateMap,
    ) -> Result<Config, ConfigUpdateError> {
        self(current, state)
    }
}

/// Builds request arguments from the values visible to a step.
///
/// Implementations must not fail on absent values; they resolve them to
/// `null` or leave them out. Closures with the signature
/// `Fn(&Scope<'_>) -> RequestArgs` implement this trait.
pub trait ArgsBuilder: Send + Sync {
    /// Returns the arguments for the current scope.
    fn build(&self, scope: &Scope<'_>) -> RequestArgs;
}

impl<F> ArgsBuilder for F
where
    F: Fn(&Scope<'_>) -> RequestArgs + Send + Sync,
{
    fn build(&self, scope: &Scope<'_>) -> RequestArgs {
        self(scope)
    }
}
