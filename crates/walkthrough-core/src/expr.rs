//! Runtime expressions that pull values from config, prior steps and the
//! current response.
//!
//! | syntax | value |
//! | --- | --- |
//! | `$steps.<name>.outputs[.<path>]` | extracted data of a prior step |
//! | `$steps.<name>.request[.<path>]` | request args of a prior step, e.g. `body.clientSecret` |
//! | `$steps.<name>.response[.<path>]` | response of a prior step, e.g. `statusCode` |
//! | `$config[.<path>]` | endpoint parameters |
//! | `$auth[.<path>]` | auth material |
//! | `$statusCode` | status of the current response |
//! | `$response.body[.<path>]` | body of the current response |
//! | `$response.header.<name>` | header of the current response |
//!
//! Every section except `$response.header` also takes a JSON pointer in
//! place of the dotted path, as in `$response.body#/sessionToken` or
//! `$steps.login.outputs#/items/0`.
//!
//! Resolution never fails. Anything absent, including steps that have not
//! run or failed without data, resolves to `null`.

use crate::config::Config;
use crate::error::ExpressionError;
use crate::path;
use crate::request::Response;
use crate::state::StepStateMap;
use crate::step::StepName;
use serde_json::Value;
use std::fmt;

/// The values an expression can see while a step runs.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    config: &'a Config,
    state: &'a StepStateMap,
    response: Option<&'a Response>,
}

impl<'a> Scope<'a> {
    /// Creates a scope without a current response.
    pub fn new(config: &'a Config, state: &'a StepStateMap) -> Self {
        Self {
            config,
            state,
            response: None,
        }
    }

    /// Returns a copy of the scope that also sees `response`.
    pub fn with_response(self, response: &'a Response) -> Self {
        Self {
            response: Some(response),
            ..self
        }
    }

    /// Returns the current config.
    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Returns the results of the steps that ran so far.
    pub fn state(&self) -> &'a StepStateMap {
        self.state
    }

    /// Returns the current response, when extracting outputs.
    pub fn response(&self) -> Option<&'a Response> {
        self.response
    }

    /// Resolves an expression in this scope.
    pub fn resolve(&self, expression: &Expression) -> Value {
        expression.resolve(self)
    }
}

/// A parsed runtime expression.
///
/// # Examples
///
/// ```
/// use walkthrough_core::Expression;
///
/// let expr = Expression::parse("$steps.Step 2.outputs.sessionToken")?;
/// assert_eq!(expr, Expression::step_output("Step 2", "sessionToken"));
/// assert_eq!(expr.to_string(), "$steps.Step 2.outputs.sessionToken");
/// # Ok::<(), walkthrough_core::ExpressionError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Extracted data of a prior step.
    StepOutput {
        /// The referenced step.
        step: StepName,
        /// Dotted path into the data; empty for all of it.
        path: String,
    },
    /// Request args of a prior step.
    StepRequest {
        /// The referenced step.
        step: StepName,
        /// Dotted path into the args (`body.x`, `query.y`).
        path: String,
    },
    /// Response of a prior step.
    StepResponse {
        /// The referenced step.
        step: StepName,
        /// Dotted path into the response (`statusCode`, `body.x`).
        path: String,
    },
    /// An endpoint parameter of the current config.
    Config(String),
    /// An auth field of the current config.
    Auth(String),
    /// Status code of the current response.
    StatusCode,
    /// Body of the current response.
    ResponseBody(String),
    /// Header of the current response.
    ResponseHeader(String),
}

#[derive(Debug, Clone, Copy)]
enum StepSection {
    Outputs,
    Request,
    Response,
}

const STEP_SECTIONS: [(&str, StepSection); 3] = [
    (".outputs", StepSection::Outputs),
    (".request", StepSection::Request),
    (".response", StepSection::Response),
];

impl Expression {
    /// Refers to a prior step's extracted data.
    pub fn step_output(step: impl Into<StepName>, path: impl Into<String>) -> Self {
        Expression::StepOutput {
            step: step.into(),
            path: path.into(),
        }
    }

    /// Refers to a prior step's request args.
    pub fn step_request(step: impl Into<StepName>, path: impl Into<String>) -> Self {
        Expression::StepRequest {
            step: step.into(),
            path: path.into(),
        }
    }

    /// Refers to a prior step's response.
    pub fn step_response(step: impl Into<StepName>, path: impl Into<String>) -> Self {
        Expression::StepResponse {
            step: step.into(),
            path: path.into(),
        }
    }

    /// Refers to an endpoint parameter.
    pub fn config(path: impl Into<String>) -> Self {
        Expression::Config(path.into())
    }

    /// Refers to an auth field.
    pub fn auth(path: impl Into<String>) -> Self {
        Expression::Auth(path.into())
    }

    /// Refers to the current response body.
    pub fn response_body(path: impl Into<String>) -> Self {
        Expression::ResponseBody(path.into())
    }

    /// Returns `true` if `input` starts like an expression.
    ///
    /// Strings that do not are treated as literals by document parameters.
    pub fn is_expression(input: &str) -> bool {
        let input = input.trim();
        input.starts_with("$steps.")
            || input == "$statusCode"
            || input.starts_with("$response.")
            || section(input, "$config").is_some()
            || section(input, "$auth").is_some()
    }

    /// Parses an expression.
    ///
    /// Step names may contain spaces and dots; the first `.outputs`,
    /// `.request` or `.response` segment separates the name from the path.
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("$steps.") {
            return parse_step(input, rest);
        }
        if input == "$statusCode" {
            return Ok(Expression::StatusCode);
        }
        if let Some(path) = section(input, "$config") {
            return Ok(Expression::Config(path.to_string()));
        }
        if let Some(path) = section(input, "$auth") {
            return Ok(Expression::Auth(path.to_string()));
        }
        if let Some(path) = section(input, "$response.body") {
            return Ok(Expression::ResponseBody(path.to_string()));
        }
        match input.strip_prefix("$response.header.") {
            Some(name) if !name.is_empty() => Ok(Expression::ResponseHeader(name.to_string())),
            _ => Err(ExpressionError::UnknownPrefix(input.to_string())),
        }
    }

    /// Resolves the expression, yielding `null` for anything absent.
    pub fn resolve(&self, scope: &Scope<'_>) -> Value {
        let resolved = match self {
            Expression::StepOutput { step, path } => scope
                .state()
                .get(step.as_str())
                .and_then(|result| path::resolve_in(&result.data, path)),
            Expression::StepRequest { step, path } => scope
                .state()
                .get(step.as_str())
                .and_then(|result| result.request.as_ref())
                .and_then(|request| path::lookup(&request.args.to_value(), path).cloned()),
            Expression::StepResponse { step, path } => scope
                .state()
                .get(step.as_str())
                .and_then(|result| result.response.as_ref())
                .and_then(|response| path::lookup(&response.to_value(), path).cloned()),
            Expression::Config(path) => path::resolve_in(&scope.config().config, path),
            Expression::Auth(path) => path::resolve_in(&scope.config().auth, path),
            Expression::StatusCode => scope
                .response()
                .map(|response| Value::from(response.status_code)),
            Expression::ResponseBody(path) => scope
                .response()
                .and_then(|response| path::lookup(&response.body, path).cloned()),
            Expression::ResponseHeader(name) => scope
                .response()
                .and_then(|response| response.header(name))
                .map(|value| Value::String(value.to_string())),
        };
        resolved.unwrap_or(Value::Null)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::StepOutput { step, path } => write_step(f, step, "outputs", path),
            Expression::StepRequest { step, path } => write_step(f, step, "request", path),
            Expression::StepResponse { step, path } => write_step(f, step, "response", path),
            Expression::Config(path) => write_section(f, "$config", path),
            Expression::Auth(path) => write_section(f, "$auth", path),
            Expression::StatusCode => write!(f, "$statusCode"),
            Expression::ResponseBody(path) => write_section(f, "$response.body", path),
            Expression::ResponseHeader(name) => write!(f, "$response.header.{name}"),
        }
    }
}

fn write_step(f: &mut fmt::Formatter<'_>, step: &StepName, section: &str, path: &str) -> fmt::Result {
    write!(f, "$steps.{step}.")?;
    write_section(f, section, path)
}

fn write_section(f: &mut fmt::Formatter<'_>, section: &str, path: &str) -> fmt::Result {
    if path.is_empty() {
        write!(f, "{section}")
    } else if path.starts_with('/') {
        write!(f, "{section}#{path}")
    } else {
        write!(f, "{section}.{path}")
    }
}

/// `"$config"` gives `""`, `"$config.a.b"` gives `"a.b"`, `"$config#/a/b"`
/// gives the pointer `"/a/b"`, `"$configs"` gives nothing.
fn section<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else if is_pointer_suffix(rest) {
        Some(&rest[1..])
    } else {
        rest.strip_prefix('.')
    }
}

/// `"#"` or `"#/..."`.
fn is_pointer_suffix(rest: &str) -> bool {
    rest == "#" || rest.starts_with("#/")
}

fn parse_step(input: &str, rest: &str) -> Result<Expression, ExpressionError> {
    let mut found: Option<(usize, usize, StepSection)> = None;
    for (marker, kind) in STEP_SECTIONS {
        let boundary = rest.match_indices(marker).find(|(pos, _)| {
            let tail = &rest[pos + marker.len()..];
            tail.is_empty() || tail.starts_with('.') || is_pointer_suffix(tail)
        });
        if let Some((pos, _)) = boundary {
            if found.map_or(true, |(best, _, _)| pos < best) {
                found = Some((pos, pos + marker.len(), kind));
            }
        }
    }

    let (name_end, path_start, kind) =
        found.ok_or_else(|| ExpressionError::MissingSection(input.to_string()))?;
    let step = &rest[..name_end];
    if step.is_empty() {
        return Err(ExpressionError::EmptyStepName(input.to_string()));
    }
    let tail = &rest[path_start..];
    let path = tail
        .strip_prefix('.')
        .or_else(|| tail.strip_prefix('#'))
        .unwrap_or_default();

    Ok(match kind {
        StepSection::Outputs => Expression::step_output(step, path),
        StepSection::Request => Expression::step_request(step, path),
        StepSection::Response => Expression::step_response(step, path),
    })
}
