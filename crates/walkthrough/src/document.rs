//! Walkthrough documents.
//!
//! A walkthrough document is a JSON or YAML description of one or more
//! workflows in the style of an Arazzo workflow file. Steps reference endpoints either by
//! permalink or by OpenAPI `operationId`; the latter are resolved through a
//! [`PermalinkIndex`] built from the API description.
//!
//! ```
//! use walkthrough::{PermalinkIndex, WalkthroughDocument};
//! use serde_json::json;
//!
//! let openapi = json!({
//!     "paths": {
//!         "/user/login": {
//!             "get": {"operationId": "loginUser", "tags": ["user"]}
//!         }
//!     }
//! });
//! let document = WalkthroughDocument::from_json(r#"{
//!     "workflows": [{
//!         "workflowId": "login",
//!         "steps": [{
//!             "stepId": "loginStep",
//!             "operationId": "loginUser",
//!             "parameters": [{"name": "username", "in": "query", "value": "user1"}],
//!             "successCodes": [200],
//!             "outputs": {"token": "$response.body"}
//!         }]
//!     }]
//! }"#).unwrap();
//!
//! let index = PermalinkIndex::from_openapi(&openapi);
//! let workflow = document.compile("login", &index).unwrap();
//! assert_eq!(workflow.step_count(), 1);
//! ```

use crate::workflow::WorkflowDefinition;
use async_trait::async_trait;
use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use walkthrough_core::{
    ArgTemplate, ArgValue, Config, ConfigUpdateError, ConfigUpdater, EndpointStep, Expression,
    ExpressionError, ParamLocation, Scope, StatusVerifier, StepDefinition, StepStateMap,
    WorkflowError,
};

/// Characters escaped in the tag segment of a permalink.
const TAG_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Errors raised while loading or compiling a walkthrough document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The document is not valid JSON or does not match the schema.
    #[error("invalid walkthrough document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The YAML text is malformed or does not match the schema.
    #[error("invalid walkthrough document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No workflow with the requested id exists in the document.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A step names an operation the permalink index does not know.
    #[error("step '{step_id}' references unknown operation '{operation_id}'")]
    UnknownOperation {
        /// The offending step.
        step_id: String,
        /// The operation it referenced.
        operation_id: String,
    },

    /// A step has no endpoint, operation or content.
    #[error("step '{0}' has no endpoint permalink, operation id or content")]
    MissingTarget(String),

    /// A content step declares request arguments it cannot send.
    #[error("content step '{0}' declares request parameters")]
    ContentWithArguments(String),

    /// A parameter value or output is a malformed expression.
    #[error("invalid expression in step '{step_id}': {source}")]
    Expression {
        /// The offending step.
        step_id: String,
        /// The parse error.
        source: ExpressionError,
    },

    /// The compiled steps do not form a valid workflow.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// A walkthrough document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkthroughDocument {
    /// API descriptions the workflows refer to.
    #[serde(default)]
    pub source_descriptions: Vec<SourceDescription>,
    /// The workflows.
    pub workflows: Vec<WorkflowDocument>,
}

/// A referenced API description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescription {
    /// Name used to refer to the description.
    pub name: String,
    /// Location of the description.
    pub url: String,
}

/// One workflow of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    /// Unique workflow id.
    pub workflow_id: String,
    /// Short summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Steps in execution order.
    pub steps: Vec<StepDocument>,
}

/// One step of a workflow document.
///
/// A step with `content` displays it. Otherwise it calls the endpoint named
/// by `endpointPermalink`, or by `operationId` through the permalink index.
/// Content steps accept header parameters only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    /// Unique step id, used as the step name.
    pub step_id: String,
    /// Display label. Falls back to the step id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// OpenAPI operation to call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Endpoint permalink to call. Takes precedence over `operationId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_permalink: Option<String>,
    /// Markdown to display instead of calling an endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Request parameters.
    #[serde(default)]
    pub parameters: Vec<ParameterDocument>,
    /// Status codes that pass verification. Empty means 200 and 201.
    #[serde(default)]
    pub success_codes: Vec<u16>,
    /// Named outputs as expressions over the response.
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// A request parameter of a step document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDocument {
    /// Parameter name.
    pub name: String,
    /// Where the parameter goes. Header parameters are merged into the config.
    #[serde(rename = "in")]
    pub location: ParamLocation,
    /// A literal, or an expression string such as `$steps.login.outputs.token`.
    pub value: Value,
}

impl WalkthroughDocument {
    /// Parses a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses a document from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Returns a workflow by id.
    pub fn workflow(&self, workflow_id: &str) -> Option<&WorkflowDocument> {
        self.workflows
            .iter()
            .find(|workflow| workflow.workflow_id == workflow_id)
    }

    /// Compiles one workflow by id.
    pub fn compile(
        &self,
        workflow_id: &str,
        index: &PermalinkIndex,
    ) -> Result<WorkflowDefinition, DocumentError> {
        self.workflow(workflow_id)
            .ok_or_else(|| DocumentError::WorkflowNotFound(workflow_id.to_string()))?
            .compile(index)
    }

    /// Compiles every workflow in document order.
    pub fn compile_all(
        &self,
        index: &PermalinkIndex,
    ) -> Result<Vec<WorkflowDefinition>, DocumentError> {
        self.workflows
            .iter()
            .map(|workflow| workflow.compile(index))
            .collect()
    }
}

/// Tries JSON first, then YAML.
impl FromStr for WalkthroughDocument {
    type Err = DocumentError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_json(text).or_else(|_| Self::from_yaml(text))
    }
}

impl WorkflowDocument {
    /// Compiles the workflow into a definition.
    pub fn compile(&self, index: &PermalinkIndex) -> Result<WorkflowDefinition, DocumentError> {
        let mut builder = WorkflowDefinition::builder(self.workflow_id.clone());
        for step in &self.steps {
            builder = builder.add_step(step.compile(index)?);
        }
        Ok(builder.build()?)
    }
}

impl StepDocument {
    /// Compiles the step into a definition.
    pub fn compile(&self, index: &PermalinkIndex) -> Result<StepDefinition, DocumentError> {
        let label = self
            .description
            .clone()
            .unwrap_or_else(|| self.step_id.clone());

        let mut template = ArgTemplate::new();
        let mut headers = Vec::new();
        for parameter in &self.parameters {
            let value = ArgValue::from_json(parameter.value.clone())
                .map_err(|source| self.expression_error(source))?;
            match parameter.location {
                ParamLocation::Header => headers.push((parameter.name.clone(), value)),
                location => template = template.arg(location, parameter.name.clone(), value),
            }
        }

        let definition = match &self.content {
            Some(_) if !template.is_empty() => {
                return Err(DocumentError::ContentWithArguments(self.step_id.clone()));
            }
            Some(text) => StepDefinition::content(self.step_id.clone(), label, text.clone()),
            None => {
                let mut endpoint = EndpointStep::new(self.permalink(index)?)
                    .with_description(label.clone())
                    .with_args(template)
                    .with_verifier(self.verifier());
                for (name, raw) in &self.outputs {
                    let expression =
                        Expression::parse(raw).map_err(|source| self.expression_error(source))?;
                    endpoint = endpoint.with_output(name.clone(), expression);
                }
                StepDefinition::endpoint(self.step_id.clone(), label, endpoint)
            }
        };

        if headers.is_empty() {
            Ok(definition)
        } else {
            Ok(definition.update_config_with(HeaderParams { headers }))
        }
    }

    fn permalink(&self, index: &PermalinkIndex) -> Result<String, DocumentError> {
        if let Some(permalink) = &self.endpoint_permalink {
            return Ok(permalink.clone());
        }
        let operation_id = self
            .operation_id
            .as_deref()
            .ok_or_else(|| DocumentError::MissingTarget(self.step_id.clone()))?;
        index
            .get(operation_id)
            .map(str::to_string)
            .ok_or_else(|| DocumentError::UnknownOperation {
                step_id: self.step_id.clone(),
                operation_id: operation_id.to_string(),
            })
    }

    fn verifier(&self) -> StatusVerifier {
        if self.success_codes.is_empty() {
            StatusVerifier::default()
        } else {
            StatusVerifier::accepting(self.success_codes.iter().copied())
        }
    }

    fn expression_error(&self, source: ExpressionError) -> DocumentError {
        DocumentError::Expression {
            step_id: self.step_id.clone(),
            source,
        }
    }
}

/// Merges a step's header parameters into `config.config`.
struct HeaderParams {
    headers: Vec<(String, ArgValue)>,
}

#[async_trait]
impl ConfigUpdater for HeaderParams {
    async fn update(
        &self,
        current: Config,
        state: &StepStateMap,
    ) -> Result<Config, ConfigUpdateError> {
        let mut patch = Config::new();
        let scope = Scope::new(&current, state);
        for (name, value) in &self.headers {
            patch.config.insert(name.clone(), value.resolve(&scope));
        }
        Ok(current.merge(patch))
    }
}

/// Maps OpenAPI operation ids to endpoint permalinks.
///
/// Permalinks have the form `$e/{tag}/{operationId}`, with the operation's
/// first tag percent-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermalinkIndex {
    operations: IndexMap<String, String>,
}

impl PermalinkIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every tagged operation under `paths` of an OpenAPI description.
    ///
    /// Operations without an `operationId` or without tags are skipped.
    pub fn from_openapi(description: &Value) -> Self {
        let mut index = Self::new();
        let Some(paths) = description.get("paths").and_then(Value::as_object) else {
            return index;
        };
        for item in paths.values() {
            let Some(operations) = item.as_object() else {
                continue;
            };
            for operation in operations.values() {
                let operation_id = operation.get("operationId").and_then(Value::as_str);
                let tag = operation
                    .get("tags")
                    .and_then(Value::as_array)
                    .and_then(|tags| tags.first())
                    .and_then(Value::as_str);
                if let (Some(operation_id), Some(tag)) = (operation_id, tag) {
                    index.insert(operation_id, Self::permalink(tag, operation_id));
                }
            }
        }
        index
    }

    /// Indexes an OpenAPI description given as JSON or YAML text.
    pub fn from_openapi_str(text: &str) -> Result<Self, DocumentError> {
        let description = match serde_json::from_str::<Value>(text) {
            Ok(description) => description,
            Err(_) => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
                serde_json::to_value(yaml)?
            }
        };
        Ok(Self::from_openapi(&description))
    }

    /// Builds the permalink for a tagged operation.
    pub fn permalink(tag: &str, operation_id: &str) -> String {
        format!(
            "$e/{}/{}",
            utf8_percent_encode(tag, TAG_ENCODE_SET),
            operation_id
        )
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, operation_id: impl Into<String>, permalink: impl Into<String>) {
        self.operations.insert(operation_id.into(), permalink.into());
    }

    /// Returns the permalink for an operation.
    pub fn get(&self, operation_id: &str) -> Option<&str> {
        self.operations.get(operation_id).map(String::as_str)
    }

    /// Iterates over `(operation_id, permalink)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.operations
            .iter()
            .map(|(operation_id, permalink)| (operation_id.as_str(), permalink.as_str()))
    }

    /// Returns the number of indexed operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if no operations are indexed.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
