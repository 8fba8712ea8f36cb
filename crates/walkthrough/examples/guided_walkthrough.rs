//! A session-token walkthrough against an in-memory portal.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use walkthrough::prelude::*;

/// Answers the two demo endpoints and prints whatever it is asked to show.
struct DemoPortal;

#[async_trait]
impl PortalHost for DemoPortal {
    async fn display_content(&self, text: &str) {
        println!("{}", text);
    }

    async fn execute_endpoint(
        &self,
        request: &RequestSpec,
        config: &Config,
        _cancel: &CancellationToken,
    ) -> Result<Response, EndpointError> {
        match request.endpoint_permalink.as_str() {
            "$e/Session%20Management/StartSession" => Ok(Response::new(200)
                .with_body(json!({"sessionToken": "s-8f2c", "clientID": "client-42"}))),
            "$e/Management/ListActiveCustomers" => {
                if config.auth_value("bearerAuth.AccessToken").is_none() {
                    return Ok(Response::new(401));
                }
                Ok(Response::new(200).with_body(json!({
                    "customers": [{"id": 1, "name": "Ada"}, {"id": 2, "name": "Grace"}]
                })))
            }
            other => Err(EndpointError::Resolution {
                permalink: other.to_string(),
                details: "unknown endpoint".to_string(),
            }),
        }
    }
}

fn session_workflow() -> Result<WorkflowDefinition, WorkflowError> {
    let start_session = EndpointStep::new("$e/Session%20Management/StartSession")
        .with_description(
            "This endpoint initiates session management and returns an access token \
             and client ID that is required in subsequent API requests.",
        )
        .with_args(ArgTemplate::new().arg(ParamLocation::Body, "clientSecret", "demo-secret"))
        .with_verifier(
            StatusVerifier::accepting([200])
                .with_auth_rejection([400, 401], "Authentication Token is Required")
                .with_failure_message(
                    "API Call wasn't able to get a valid response. Please try again.",
                ),
        );

    let list_customers = EndpointStep::new("$e/Management/ListActiveCustomers")
        .with_description("This step fetches the list of active customers.")
        .with_args(
            ArgTemplate::new()
                .arg(
                    ParamLocation::Body,
                    "ClientID",
                    Expression::step_output("Step 2", "clientID"),
                )
                .arg(
                    ParamLocation::Body,
                    "ClientSecret",
                    Expression::step_request("Step 2", "body.clientSecret"),
                ),
        )
        .with_verify(|response: &Response, errors: &mut ErrorSlot| {
            if response.status_code != 200 {
                errors.set("Oops your request failed");
                return false;
            }
            true
        });

    WorkflowDefinition::builder("SampleWorkflow")
        .content(
            "Step 1",
            "How to Get Access Token",
            "## Introduction\nThis is a guided walkthrough.",
        )
        .add_step(
            StepDefinition::endpoint("Step 2", "Get Session Token", start_session)
                .update_config(|_: Config, _: &StepStateMap| Ok(Config::new())),
        )
        .add_step(
            StepDefinition::endpoint("Step 3", "Get the List of Active Customer", list_customers)
                .update_config(|config: Config, state: &StepStateMap| {
                    let token = state
                        .data_field("Step 2", "sessionToken")
                        .cloned()
                        .unwrap_or_default();
                    Ok(config.with_auth("bearerAuth.AccessToken", token))
                }),
        )
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let workflow = session_workflow()?;
    let run = WorkflowRunner::new(DemoPortal).run(&workflow).await?;

    for (name, result) in run.state().iter() {
        match &result.error_message {
            Some(message) => println!("{}: failed ({})", name, message),
            None if result.passed => println!("{}: passed", name),
            None => println!("{}: failed", name),
        }
    }

    if let Some(step) = run.halted_at() {
        eprintln!("Walkthrough stopped at {}", step);
    }

    let customers = run.state().data_field("Step 3", "customers");
    println!("Customers: {}", customers.cloned().unwrap_or_default());

    Ok(())
}
