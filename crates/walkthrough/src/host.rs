//! The capabilities a host portal provides to a run.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkthrough_core::{Config, EndpointError, RequestSpec, Response};

/// Display and transport supplied by the host.
///
/// The runner owns sequencing, config and step state; everything that
/// touches the outside world goes through this trait.
#[async_trait]
pub trait PortalHost: Send + Sync {
    /// Displays informational markdown. Makes no network call.
    async fn display_content(&self, text: &str);

    /// Resolves the request's permalink and performs the call.
    ///
    /// `config` carries the auth material and endpoint parameters current
    /// at this step. Implementations that support mid-call cancellation
    /// should watch `cancel`.
    ///
    /// A completed call returns `Ok` whatever its status code.
    async fn execute_endpoint(
        &self,
        request: &RequestSpec,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Response, EndpointError>;
}

#[async_trait]
impl<H> PortalHost for Arc<H>
where
    H: PortalHost + ?Sized,
{
    async fn display_content(&self, text: &str) {
        self.as_ref().display_content(text).await
    }

    async fn execute_endpoint(
        &self,
        request: &RequestSpec,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Response, EndpointError> {
        self.as_ref().execute_endpoint(request, config, cancel).await
    }
}
