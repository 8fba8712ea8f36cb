//! Request and response shapes exchanged with the host.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Where a request argument is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// A field of the JSON request body.
    Body,
    /// A templated path segment.
    Path,
    /// A query string parameter.
    Query,
    /// A request header.
    Header,
    /// A cookie sent with the request.
    Cookie,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamLocation::Body => write!(f, "body"),
            ParamLocation::Path => write!(f, "path"),
            ParamLocation::Query => write!(f, "query"),
            ParamLocation::Header => write!(f, "header"),
            ParamLocation::Cookie => write!(f, "cookie"),
        }
    }
}

/// Resolved arguments for one endpoint call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestArgs {
    /// Request body. Named body arguments make this an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Path parameters.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub path: IndexMap<String, Value>,
    /// Query parameters.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query: IndexMap<String, Value>,
    /// Header parameters.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, Value>,
    /// Cookies.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub cookies: IndexMap<String, Value>,
}

impl RequestArgs {
    /// Creates empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, location: ParamLocation, name: impl Into<String>, value: Value) -> Self {
        self.insert(location, name, value);
        self
    }

    /// Inserts a named argument.
    ///
    /// A named body argument turns a missing or non-object body into an
    /// object first.
    pub fn insert(&mut self, location: ParamLocation, name: impl Into<String>, value: Value) {
        let name = name.into();
        match location {
            ParamLocation::Body => {
                let body = self.body.get_or_insert_with(|| Value::Object(Map::new()));
                if !body.is_object() {
                    *body = Value::Object(Map::new());
                }
                if let Value::Object(fields) = body {
                    fields.insert(name, value);
                }
            }
            ParamLocation::Path => {
                self.path.insert(name, value);
            }
            ParamLocation::Query => {
                self.query.insert(name, value);
            }
            ParamLocation::Header => {
                self.headers.insert(name, value);
            }
            ParamLocation::Cookie => {
                self.cookies.insert(name, value);
            }
        }
    }

    /// Returns a named argument.
    pub fn get(&self, location: ParamLocation, name: &str) -> Option<&Value> {
        match location {
            ParamLocation::Body => self.body.as_ref().and_then(|body| body.get(name)),
            ParamLocation::Path => self.path.get(name),
            ParamLocation::Query => self.query.get(name),
            ParamLocation::Header => self.headers.get(name),
            ParamLocation::Cookie => self.cookies.get(name),
        }
    }

    /// Returns `true` if no argument of any kind is set.
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.path.is_empty()
            && self.query.is_empty()
            && self.headers.is_empty()
            && self.cookies.is_empty()
    }

    /// Returns the arguments as a JSON object keyed by location.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Identifies a documented endpoint and the arguments to call it with.
///
/// The label and description are what the host shows next to the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    /// Display label of the step making the call.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// Explanation of what the endpoint does.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Stable identifier of the endpoint in the host's API description.
    pub endpoint_permalink: String,
    /// Resolved call arguments.
    #[serde(default)]
    pub args: RequestArgs,
}

impl RequestSpec {
    /// Creates a request with no arguments.
    pub fn new(endpoint_permalink: impl Into<String>) -> Self {
        Self {
            endpoint_permalink: endpoint_permalink.into(),
            ..Self::default()
        }
    }

    /// Sets the step label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the endpoint description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replaces the arguments.
    pub fn with_args(mut self, args: RequestArgs) -> Self {
        self.args = args;
        self
    }
}

/// A completed endpoint call as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers in the order the host reported them.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Decoded body; `null` when empty.
    #[serde(default)]
    pub body: Value,
}

impl Response {
    /// Creates an empty response with the given status.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Returns the response as a JSON object (`statusCode`, `headers`, `body`).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
