//! Step definitions.

use crate::args::ArgTemplate;
use crate::config::Config;
use crate::error::ConfigUpdateError;
use crate::expr::{Expression, Scope};
use crate::request::{RequestArgs, RequestSpec, Response};
use crate::state::StepStateMap;
use crate::traits::{ArgsBuilder, ConfigUpdater};
use crate::verify::{ErrorSlot, StatusVerifier, Verifier};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Type-safe step name wrapper.
///
/// Step names are the keys of a workflow and of its [`StepStateMap`]. They
/// may contain spaces ("Step 2").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// An informational step: the host displays text, nothing is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStep {
    text: String,
}

impl ContentStep {
    /// Creates a content step from markdown text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the text to display.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A step that calls a documented endpoint and verifies the response.
///
/// # Examples
///
/// ```
/// use walkthrough_core::{ArgTemplate, EndpointStep, Expression, ParamLocation, StatusVerifier};
///
/// let step = EndpointStep::new("$e/Management/ListActiveCustomers")
///     .with_description("This step fetches the list of active customers.")
///     .with_args(
///         ArgTemplate::new()
///             .arg(ParamLocation::Body, "ClientID", Expression::step_output("Step 2", "clientID")),
///     )
///     .with_verifier(StatusVerifier::accepting([200]).with_failure_message("Oops your request failed"));
///
/// assert_eq!(step.permalink(), "$e/Management/ListActiveCustomers");
/// ```
#[derive(Clone)]
pub struct EndpointStep {
    permalink: String,
    description: String,
    args: Option<Arc<dyn ArgsBuilder>>,
    verifier: Arc<dyn Verifier>,
    outputs: IndexMap<String, Expression>,
}

impl fmt::Debug for EndpointStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointStep")
            .field("permalink", &self.permalink)
            .field("description", &self.description)
            .field("has_args", &self.args.is_some())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EndpointStep {
    /// Creates a step for the given permalink.
    ///
    /// Without further configuration the step sends no arguments, accepts
    /// 200 and 201 and exposes the response body's fields as its data.
    pub fn new(permalink: impl Into<String>) -> Self {
        Self {
            permalink: permalink.into(),
            description: String::new(),
            args: None,
            verifier: Arc::new(StatusVerifier::default()),
            outputs: IndexMap::new(),
        }
    }

    /// Sets the description shown next to the endpoint.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Resolves arguments from a template of literals and expressions.
    pub fn with_args(self, template: ArgTemplate) -> Self {
        self.with_args_builder(template)
    }

    /// Resolves arguments with a closure over the current scope.
    pub fn with_args_fn<F>(self, build: F) -> Self
    where
        F: Fn(&Scope<'_>) -> RequestArgs + Send + Sync + 'static,
    {
        self.with_args_builder(build)
    }

    /// Resolves arguments with any [`ArgsBuilder`].
    pub fn with_args_builder(mut self, builder: impl ArgsBuilder + 'static) -> Self {
        self.args = Some(Arc::new(builder));
        self
    }

    /// Verifies responses with a closure, the `verify(response, setError)` shape.
    pub fn with_verify<F>(self, verify: F) -> Self
    where
        F: Fn(&Response, &mut ErrorSlot) -> bool + Send + Sync + 'static,
    {
        self.with_verifier(verify)
    }

    /// Verifies responses with any [`Verifier`].
    pub fn with_verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Declares a named output extracted from the response.
    ///
    /// Once any output is declared, only declared outputs become the step's
    /// data.
    pub fn with_output(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.outputs.insert(name.into(), expression);
        self
    }

    /// Returns the endpoint permalink.
    pub fn permalink(&self) -> &str {
        &self.permalink
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the verifier.
    pub fn verifier(&self) -> &dyn Verifier {
        self.verifier.as_ref()
    }

    /// Returns the declared outputs.
    pub fn outputs(&self) -> &IndexMap<String, Expression> {
        &self.outputs
    }

    /// Builds the request for the current scope.
    pub fn request(&self, scope: &Scope<'_>) -> RequestSpec {
        let args = self
            .args
            .as_ref()
            .map(|builder| builder.build(scope))
            .unwrap_or_default();
        RequestSpec::new(self.permalink.clone())
            .with_description(self.description.clone())
            .with_args(args)
    }

    /// Extracts the step's data from a response.
    ///
    /// Declared outputs are evaluated against the response. With no declared
    /// outputs, the fields of an object body are used as-is.
    pub fn extract(&self, response: &Response, scope: &Scope<'_>) -> Map<String, Value> {
        if self.outputs.is_empty() {
            return match &response.body {
                Value::Object(fields) => fields.clone(),
                _ => Map::new(),
            };
        }
        let scope = scope.with_response(response);
        self.outputs
            .iter()
            .map(|(name, expression)| (name.clone(), expression.resolve(&scope)))
            .collect()
    }
}

/// What a step does when it runs.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Display static content.
    Content(ContentStep),
    /// Call an endpoint and verify the response.
    Endpoint(EndpointStep),
}

/// A named step of a workflow.
#[derive(Clone)]
pub struct StepDefinition {
    name: StepName,
    label: String,
    kind: StepKind,
    config_updater: Option<Arc<dyn ConfigUpdater>>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("updates_config", &self.config_updater.is_some())
            .finish()
    }
}

impl StepDefinition {
    /// Creates a content step.
    pub fn content(
        name: impl Into<StepName>,
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(name, label, StepKind::Content(ContentStep::new(text)))
    }

    /// Creates an endpoint step.
    pub fn endpoint(
        name: impl Into<StepName>,
        label: impl Into<String>,
        endpoint: EndpointStep,
    ) -> Self {
        Self::new(name, label, StepKind::Endpoint(endpoint))
    }

    /// Creates a step of any kind.
    pub fn new(name: impl Into<StepName>, label: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            config_updater: None,
        }
    }

    /// Updates the run's config with a closure before the step executes.
    ///
    /// The closure receives the full current config and the results of the
    /// steps that ran before this one.
    pub fn update_config<F>(self, update: F) -> Self
    where
        F: Fn(Config, &StepStateMap) -> Result<Config, ConfigUpdateError> + Send + Sync + 'static,
    {
        self.update_config_with(update)
    }

    /// Updates the run's config with any [`ConfigUpdater`].
    pub fn update_config_with(mut self, updater: impl ConfigUpdater + 'static) -> Self {
        self.config_updater = Some(Arc::new(updater));
        self
    }

    /// Returns the step name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Returns the display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns what the step does.
    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Returns the config updater, if any.
    pub fn config_updater(&self) -> Option<&dyn ConfigUpdater> {
        self.config_updater.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ParamLocation;
    use serde_json::json;

    #[test]
    fn test_step_name() {
        let name = StepName::new("Step 2");
        assert_eq!(name.as_str(), "Step 2");

        let name: StepName = "Step 2".into();
        assert_eq!(name, "Step 2");
    }

    #[test]
    fn test_endpoint_defaults() {
        let step = EndpointStep::new("$e/Pets/findPets");
        let state = StepStateMap::new();
        let config = Config::new();
        let scope = Scope::new(&config, &state);

        let request = step.request(&scope);
        assert_eq!(request.endpoint_permalink, "$e/Pets/findPets");
        assert!(request.description.is_empty());
        assert!(request.args.is_empty());

        let described = EndpointStep::new("$e/Pets/findPets").with_description("Finds pets");
        assert_eq!(described.request(&scope).description, "Finds pets");

        let mut slot = ErrorSlot::new();
        assert!(step.verifier().verify(&Response::new(201), &mut slot));
        assert!(!step.verifier().verify(&Response::new(500), &mut slot));
    }

    #[test]
    fn test_extract_uses_body_fields_without_outputs() {
        let step = EndpointStep::new("$e/Session/StartSession");
        let state = StepStateMap::new();
        let config = Config::new();
        let scope = Scope::new(&config, &state);

        let response = Response::new(200).with_body(json!({"sessionToken": "t", "clientID": "c"}));
        let data = step.extract(&response, &scope);
        assert_eq!(data.get("sessionToken"), Some(&json!("t")));
        assert_eq!(data.get("clientID"), Some(&json!("c")));

        let data = step.extract(&Response::new(200).with_body(json!([1, 2])), &scope);
        assert!(data.is_empty());
    }

    #[test]
    fn test_extract_declared_outputs_only() {
        let step = EndpointStep::new("$e/Session/StartSession")
            .with_output("token", Expression::response_body("session.token"))
            .with_output("status", Expression::StatusCode)
            .with_output("missing", Expression::response_body("nope"));
        let state = StepStateMap::new();
        let config = Config::new();
        let scope = Scope::new(&config, &state);

        let response = Response::new(200).with_body(json!({"session": {"token": "abc"}, "extra": 1}));
        let data = step.extract(&response, &scope);
        assert_eq!(Value::Object(data), json!({"token": "abc", "status": 200, "missing": null}));
    }

    #[test]
    fn test_args_closure_sees_config() {
        let step = EndpointStep::new("$e/Pets/getPet").with_args_fn(|scope| {
            let id = scope.config().param("petId").cloned().unwrap_or(Value::Null);
            RequestArgs::new().with(ParamLocation::Path, "petId", id)
        });
        let state = StepStateMap::new();
        let config = Config::new().with_param("petId", 42);
        let request = step.request(&Scope::new(&config, &state));
        assert_eq!(request.args.get(ParamLocation::Path, "petId"), Some(&json!(42)));
    }

    #[test]
    fn test_definition_accessors() {
        let step = StepDefinition::content("Step 1", "How to Get Access Token", "## Introduction")
            .update_config(|config, _state| Ok(config.with_param("api_key", "X")));

        assert_eq!(step.name().as_str(), "Step 1");
        assert_eq!(step.label(), "How to Get Access Token");
        assert!(step.config_updater().is_some());
        assert!(matches!(step.kind(), StepKind::Content(content) if content.text() == "## Introduction"));
    }
}
