//! Guided API walkthroughs for developer portals.
//!
//! A walkthrough is an ordered list of steps. Content steps display
//! markdown; endpoint steps call an API through the host portal, verify the
//! response and extract data that later steps and config updaters can read.
//!
//! # Example
//!
//! ```rust,no_run
//! use walkthrough::prelude::*;
//! use async_trait::async_trait;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Portal;
//!
//! #[async_trait]
//! impl PortalHost for Portal {
//!     async fn display_content(&self, text: &str) {
//!         println!("{text}");
//!     }
//!
//!     async fn execute_endpoint(
//!         &self,
//!         request: &RequestSpec,
//!         _config: &Config,
//!         _cancel: &CancellationToken,
//!     ) -> Result<Response, EndpointError> {
//!         Ok(Response::new(200).with_body(json!({"sessionToken": "abc"})))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), WorkflowError> {
//!     let workflow = WorkflowDefinition::builder("GetAccessToken")
//!         .content("Step 1", "How to Get Access Token", "## Introduction")
//!         .endpoint(
//!             "Step 2",
//!             "Get Session Token",
//!             EndpointStep::new("$e/Session%20Management/StartSession"),
//!         )
//!         .build()?;
//!
//!     let run = WorkflowRunner::new(Portal).run(&workflow).await?;
//!     assert_eq!(run.state().data_field("Step 2", "sessionToken"), Some(&json!("abc")));
//!     Ok(())
//! }
//! ```

mod document;
mod host;
mod runner;
mod workflow;

// Re-export core types
pub use walkthrough_core::*;

pub use document::{
    DocumentError, ParameterDocument, PermalinkIndex, SourceDescription, StepDocument,
    WalkthroughDocument, WorkflowDocument,
};
pub use host::PortalHost;
pub use runner::{RunPolicy, WorkflowRun, WorkflowRunner};
pub use workflow::{WorkflowBuilder, WorkflowDefinition};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        ArgTemplate, Config, ConfigUpdateError, EndpointError, EndpointStep, ErrorSlot,
        Expression, ParamLocation, PortalHost, RequestArgs, RequestSpec, Response, RetryPolicy,
        RunPolicy, StatusVerifier, StepDefinition, StepName, StepResult, StepStateMap,
        WorkflowBuilder, WorkflowDefinition, WorkflowError, WorkflowRun, WorkflowRunner,
    };
}
