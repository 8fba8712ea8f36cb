//! Declarative request arguments.

use crate::error::ExpressionError;
use crate::expr::{Expression, Scope};
use crate::request::{ParamLocation, RequestArgs};
use crate::traits::ArgsBuilder;
use serde_json::Value;

/// One argument value: a literal or an expression resolved at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Sent as-is.
    Literal(Value),
    /// Resolved against the step's scope; absent values become `null`.
    Expr(Expression),
}

impl ArgValue {
    /// Interprets a JSON value from a document.
    ///
    /// Strings that look like expressions are parsed as such; every other
    /// value is a literal.
    pub fn from_json(value: Value) -> Result<Self, ExpressionError> {
        match value {
            Value::String(text) if Expression::is_expression(&text) => {
                Expression::parse(&text).map(ArgValue::Expr)
            }
            other => Ok(ArgValue::Literal(other)),
        }
    }

    /// Resolves the value in a scope.
    pub fn resolve(&self, scope: &Scope<'_>) -> Value {
        match self {
            ArgValue::Literal(value) => value.clone(),
            ArgValue::Expr(expression) => expression.resolve(scope),
        }
    }
}

impl From<Expression> for ArgValue {
    fn from(expression: Expression) -> Self {
        ArgValue::Expr(expression)
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Literal(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Literal(Value::String(value))
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Literal(Value::from(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Literal(Value::Bool(value))
    }
}

/// Named arguments resolved against the step's scope when it runs.
///
/// # Examples
///
/// ```
/// use walkthrough_core::{
///     ArgTemplate, ArgsBuilder, Config, Expression, ParamLocation, Scope, StepStateMap,
/// };
/// use serde_json::json;
///
/// let template = ArgTemplate::new()
///     .arg(ParamLocation::Query, "status", "available")
///     .arg(ParamLocation::Header, "api_key", Expression::config("api_key"));
///
/// let config = Config::new().with_param("api_key", "X");
/// let state = StepStateMap::new();
/// let args = template.build(&Scope::new(&config, &state));
///
/// assert_eq!(args.get(ParamLocation::Query, "status"), Some(&json!("available")));
/// assert_eq!(args.get(ParamLocation::Header, "api_key"), Some(&json!("X")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgTemplate {
    body: Option<ArgValue>,
    entries: Vec<(ParamLocation, String, ArgValue)>,
}

impl ArgTemplate {
    /// Creates an empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named argument.
    pub fn arg(
        mut self,
        location: ParamLocation,
        name: impl Into<String>,
        value: impl Into<ArgValue>,
    ) -> Self {
        self.entries.push((location, name.into(), value.into()));
        self
    }

    /// Sets the whole body. Named body arguments are added on top of it.
    pub fn body(mut self, value: impl Into<ArgValue>) -> Self {
        self.body = Some(value.into());
        self
    }

    /// Iterates over the named arguments in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (ParamLocation, &str, &ArgValue)> {
        self.entries
            .iter()
            .map(|(location, name, value)| (*location, name.as_str(), value))
    }

    /// Returns `true` if the template has no arguments.
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.entries.is_empty()
    }
}

impl ArgsBuilder for ArgTemplate {
    fn build(&self, scope: &Scope<'_>) -> RequestArgs {
        let mut args = RequestArgs::new();
        if let Some(body) = &self.body {
            args.body = Some(body.resolve(scope));
        }
        for (location, name, value) in &self.entries {
            args.insert(*location, name.clone(), value.resolve(scope));
        }
        args
    }
}
