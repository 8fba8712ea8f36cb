use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use walkthrough::prelude::*;
use walkthrough::{StepKind, GENERIC_FAILURE_MESSAGE};

#[derive(Debug, Clone)]
struct Call {
    label: String,
    description: String,
    permalink: String,
    args: RequestArgs,
    config: Config,
}

/// In-memory host with scripted responses per permalink.
///
/// Unscripted permalinks answer 200 with an empty object body.
#[derive(Default)]
struct MockHost {
    scripted: Mutex<HashMap<String, VecDeque<Result<Response, EndpointError>>>>,
    calls: Mutex<Vec<Call>>,
    displayed: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockHost {
    fn new() -> Self {
        Self::default()
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn respond(self, permalink: &str, result: Result<Response, EndpointError>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(permalink.to_string())
            .or_default()
            .push_back(result);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn displayed(&self) -> Vec<String> {
        self.displayed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortalHost for MockHost {
    async fn display_content(&self, text: &str) {
        self.displayed.lock().unwrap().push(text.to_string());
    }

    async fn execute_endpoint(
        &self,
        request: &RequestSpec,
        config: &Config,
        _cancel: &CancellationToken,
    ) -> Result<Response, EndpointError> {
        self.calls.lock().unwrap().push(Call {
            label: request.label.clone(),
            description: request.description.clone(),
            permalink: request.endpoint_permalink.clone(),
            args: request.args.clone(),
            config: config.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&request.endpoint_permalink)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(Response::new(200).with_body(json!({}))))
    }
}

fn runner(host: &Arc<MockHost>) -> WorkflowRunner {
    WorkflowRunner::new(Arc::clone(host))
}

fn names(state: &StepStateMap) -> Vec<&str> {
    state.names().map(StepName::as_str).collect()
}

#[tokio::test]
async fn test_state_keys_follow_definition_order() {
    let host = Arc::new(MockHost::new());
    let workflow = WorkflowDefinition::builder("order")
        .content("intro", "Intro", "## Introduction")
        .endpoint("zeta", "Zeta", EndpointStep::new("$e/Tag/Zeta"))
        .endpoint("alpha", "Alpha", EndpointStep::new("$e/Tag/Alpha"))
        .build()
        .expect("valid workflow");

    let run = assert_ok!(runner(&host).run(&workflow).await);

    assert!(run.is_complete());
    assert_eq!(names(run.state()), vec!["intro", "zeta", "alpha"]);
    assert_eq!(host.displayed(), vec!["## Introduction".to_string()]);
    let permalinks: Vec<_> = host.calls().into_iter().map(|c| c.permalink).collect();
    assert_eq!(permalinks, vec!["$e/Tag/Zeta", "$e/Tag/Alpha"]);

    let intro = run.state().get("intro").unwrap();
    assert!(intro.passed);
    assert!(intro.request.is_none());
}

#[tokio::test]
async fn test_host_receives_label_and_description() {
    let host = Arc::new(MockHost::new());
    let workflow = WorkflowDefinition::builder("display")
        .endpoint(
            "Step 3",
            "Get the List of Active Customer",
            EndpointStep::new("$e/Management/ListActiveCustomers")
                .with_description("This step fetches the list of active customers."),
        )
        .endpoint("Step 4", "Undocumented", EndpointStep::new("$e/Tag/Plain"))
        .build()
        .expect("valid workflow");

    let run = assert_ok!(runner(&host).run(&workflow).await);

    let calls = host.calls();
    assert_eq!(calls[0].label, "Get the List of Active Customer");
    assert_eq!(calls[0].description, "This step fetches the list of active customers.");
    assert_eq!(calls[1].label, "Undocumented");
    assert_eq!(calls[1].description, "");

    let recorded = run.state().get("Step 3").and_then(|r| r.request.as_ref()).unwrap();
    assert_eq!(recorded.label, "Get the List of Active Customer");
    assert_eq!(recorded.description, "This step fetches the list of active customers.");
}

#[tokio::test]
async fn test_steps_only_see_earlier_results() {
    let host = Arc::new(MockHost::new());
    let seen: Arc<Mutex<Vec<(String, Vec<String>)>>> = Arc::default();

    let observe = |name: &'static str| {
        let seen = Arc::clone(&seen);
        move |config: Config, state: &StepStateMap| -> Result<Config, ConfigUpdateError> {
            let visible = state.names().map(|n| n.to_string()).collect();
            seen.lock().unwrap().push((name.to_string(), visible));
            Ok(config)
        }
    };

    let workflow = WorkflowDefinition::builder("causality")
        .add_step(StepDefinition::content("A", "A", "a").update_config(observe("A")))
        .add_step(
            StepDefinition::endpoint("B", "B", EndpointStep::new("$e/Tag/B"))
                .update_config(observe("B")),
        )
        .add_step(
            StepDefinition::endpoint("C", "C", EndpointStep::new("$e/Tag/C"))
                .update_config(observe("C")),
        )
        .build()
        .expect("valid workflow");

    assert_ok!(runner(&host).run(&workflow).await);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("A".to_string(), vec![]),
            ("B".to_string(), vec!["A".to_string()]),
            ("C".to_string(), vec!["A".to_string(), "B".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_config_updates_accumulate() {
    let host = Arc::new(MockHost::new());
    let workflow = WorkflowDefinition::builder("config")
        .add_step(
            StepDefinition::content("A", "Set API key", "a").update_config(|config: Config, _: &StepStateMap| {
                Ok(config.with_param("api_key", "X"))
            }),
        )
        .add_step(
            StepDefinition::endpoint("B", "Authorize", EndpointStep::new("$e/Tag/B")).update_config(
                |config: Config, _: &StepStateMap| -> Result<Config, ConfigUpdateError> {
                    config.require_param("api_key")?;
                    Ok(config.with_auth("bearerAuth.AccessToken", "t-1"))
                },
            ),
        )
        .add_step(
            StepDefinition::content("C", "Region", "c").update_config(|config: Config, _: &StepStateMap| {
                Ok(config.with_param("region", "eu"))
            }),
        )
        .build()
        .expect("valid workflow");

    let run = assert_ok!(runner(&host).run(&workflow).await);

    let config = run.config();
    assert_eq!(config.param("api_key"), Some(&json!("X")));
    assert_eq!(config.param("region"), Some(&json!("eu")));
    assert_eq!(config.auth_value("bearerAuth.AccessToken"), Some(&json!("t-1")));

    // The endpoint call sees the config as updated by its own step.
    let calls = host.calls();
    let call = &calls[0];
    assert_eq!(call.config.param("api_key"), Some(&json!("X")));
    assert_eq!(call.config.auth_value("bearerAuth.AccessToken"), Some(&json!("t-1")));
    assert_eq!(call.config.param("region"), None);
}

#[tokio::test]
async fn test_config_update_error_aborts_run() {
    let host = Arc::new(MockHost::new());
    let workflow = WorkflowDefinition::builder("missing")
        .add_step(
            StepDefinition::endpoint("A", "A", EndpointStep::new("$e/Tag/A")).update_config(
                |config: Config, _: &StepStateMap| -> Result<Config, ConfigUpdateError> {
                    config.require_auth("bearerAuth.AccessToken")?;
                    Ok(config)
                },
            ),
        )
        .build()
        .expect("valid workflow");

    let err = assert_err!(runner(&host).run(&workflow).await);
    match err {
        WorkflowError::ConfigUpdate { step_name, source } => {
            assert_eq!(step_name, "A");
            assert_eq!(
                source,
                ConfigUpdateError::MissingField("auth.bearerAuth.AccessToken".to_string())
            );
        }
        other => panic!("Unexpected error type: {other}"),
    }
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_args_derive_from_prior_step() {
    let host = Arc::new(
        MockHost::new().respond(
            "$e/Tag/A",
            Ok(Response::new(200).with_body(json!({"token": "abc"}))),
        ),
    );
    let workflow = WorkflowDefinition::builder("causal-args")
        .endpoint("A", "Login", EndpointStep::new("$e/Tag/A"))
        .endpoint(
            "B",
            "Use token",
            EndpointStep::new("$e/Tag/B").with_args(
                ArgTemplate::new().arg(
                    ParamLocation::Query,
                    "token",
                    Expression::step_output("A", "token"),
                ),
            ),
        )
        .build()
        .expect("valid workflow");

    let run = assert_ok!(runner(&host).run(&workflow).await);

    let b = run.state().get("B").unwrap();
    let request = b.request.as_ref().unwrap();
    assert_eq!(request.args.get(ParamLocation::Query, "token"), Some(&json!("abc")));
    assert_eq!(
        host.calls()[1].args.get(ParamLocation::Query, "token"),
        Some(&json!("abc"))
    );
}

#[tokio::test]
async fn test_args_closure_and_declared_outputs() {
    let host = Arc::new(
        MockHost::new().respond(
            "$e/Session%20Management/StartSession",
            Ok(Response::new(201)
                .with_header("X-Rate-Limit", "100")
                .with_body(json!({"sessionToken": "s-1", "expires": 3600}))),
        ),
    );
    let workflow = WorkflowDefinition::builder("outputs")
        .endpoint(
            "Step 2",
            "Get Session Token",
            EndpointStep::new("$e/Session%20Management/StartSession")
                .with_args_fn(|scope| {
                    RequestArgs::new().with(
                        ParamLocation::Body,
                        "api_key",
                        scope.resolve(&Expression::config("api_key")),
                    )
                })
                .with_output("sessionToken", Expression::response_body("sessionToken"))
                .with_output("rateLimit", Expression::parse("$response.header.X-Rate-Limit").unwrap()),
        )
        .build()
        .expect("valid workflow");

    let initial = Config::new().with_param("api_key", "X");
    let run = assert_ok!(
        runner(&host)
            .run_with(&workflow, initial, &CancellationToken::new())
            .await
    );

    let step = run.state().get("Step 2").unwrap();
    assert!(step.passed);
    assert_eq!(step.data_field("sessionToken"), Some(&json!("s-1")));
    assert_eq!(step.data_field("rateLimit"), Some(&json!("100")));
    assert_eq!(step.data_field("expires"), None);
    assert_eq!(
        host.calls()[0].args.body,
        Some(json!({"api_key": "X"}))
    );
}

#[tokio::test]
async fn test_failed_step_halts_by_default() {
    let host = Arc::new(MockHost::new().respond(
        "$e/Tag/A",
        Ok(Response::new(500).with_body(json!({"error": "boom"}))),
    ));
    let workflow = WorkflowDefinition::builder("halt")
        .endpoint("A", "A", EndpointStep::new("$e/Tag/A"))
        .endpoint("B", "B", EndpointStep::new("$e/Tag/B"))
        .build()
        .expect("valid workflow");

    let run = assert_ok!(runner(&host).run(&workflow).await);

    assert_eq!(names(run.state()), vec!["A"]);
    let a = run.state().get("A").unwrap();
    assert!(!a.passed);
    assert_eq!(a.error_message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    assert_eq!(a.status_code(), Some(500));
    assert_eq!(run.halted_at().map(StepName::as_str), Some("A"));
    assert_eq!(host.calls().len(), 1);
}

#[tokio::test]
async fn test_continue_on_failure_reads_null() {
    let host = Arc::new(MockHost::new().respond(
        "$e/Tag/A",
        Ok(Response::new(401).with_body(json!("unauthorized"))),
    ));
    let workflow = WorkflowDefinition::builder("continue")
        .endpoint(
            "A",
            "Login",
            EndpointStep::new("$e/Tag/A").with_verifier(
                StatusVerifier::accepting([200])
                    .with_auth_rejection([400, 401], "Authentication Token is Required"),
            ),
        )
        .endpoint(
            "B",
            "Use token",
            EndpointStep::new("$e/Tag/B").with_args(ArgTemplate::new().arg(
                ParamLocation::Header,
                "Authorization",
                Expression::step_output("A", "sessionToken"),
            )),
        )
        .build()
        .expect("valid workflow");

    let run = assert_ok!(
        runner(&host)
            .with_policy(RunPolicy::default().with_halt_on_failure(false))
            .run(&workflow)
            .await
    );

    assert!(run.is_complete());
    assert_eq!(names(run.state()), vec!["A", "B"]);
    let failures = run.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].step_name, "A");
    assert_eq!(failures[0].message, "Authentication Token is Required");
    assert_eq!(
        host.calls()[1].args.get(ParamLocation::Header, "Authorization"),
        Some(&serde_json::Value::Null)
    );
}

#[tokio::test]
async fn test_custom_verifier_closure() {
    let host = Arc::new(MockHost::new().respond(
        "$e/Tag/A",
        Ok(Response::new(200).with_body(json!({"items": []}))),
    ));
    let workflow = WorkflowDefinition::builder("closure")
        .endpoint(
            "A",
            "List",
            EndpointStep::new("$e/Tag/A").with_verify(|response: &Response, errors: &mut ErrorSlot| {
                let empty = response.body["items"].as_array().map_or(true, Vec::is_empty);
                if empty {
                    errors.set("No active customers were returned");
                }
                !empty
            }),
        )
        .build()
        .expect("valid workflow");

    let run = assert_ok!(runner(&host).run(&workflow).await);
    let err = assert_err!(run.ensure_passed());
    assert_eq!(
        err.to_string(),
        "Verification failed in step 'A': No active customers were returned"
    );
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let host = Arc::new(MockHost::new());
    let workflow = WorkflowDefinition::builder("idempotent")
        .content("intro", "Intro", "hello")
        .endpoint("A", "A", EndpointStep::new("$e/Tag/A"))
        .endpoint(
            "B",
            "B",
            EndpointStep::new("$e/Tag/B").with_args(ArgTemplate::new().arg(
                ParamLocation::Query,
                "status",
                Expression::step_response("A", "statusCode"),
            )),
        )
        .build()
        .expect("valid workflow");

    let runner = runner(&host);
    let first = assert_ok!(runner.run(&workflow).await).into_state();
    let second = assert_ok!(runner.run(&workflow).await).into_state();
    assert_eq!(first, second);
    assert_eq!(
        first.get("B").and_then(|b| b.request.as_ref()).map(|r| r.args.get(ParamLocation::Query, "status").cloned()),
        Some(Some(json!(200)))
    );
}

#[tokio::test]
async fn test_resolution_error_is_not_retried() {
    let host = Arc::new(MockHost::new().respond(
        "$e/Tag/Missing",
        Err(EndpointError::Resolution {
            permalink: "$e/Tag/Missing".to_string(),
            details: "no such operation".to_string(),
        }),
    ));
    let workflow = WorkflowDefinition::builder("resolution")
        .endpoint("A", "A", EndpointStep::new("$e/Tag/Missing"))
        .build()
        .expect("valid workflow");

    let policy = RunPolicy::default().with_transport_retry(RetryPolicy::fixed(3, Duration::from_millis(1)));
    let err = assert_err!(runner(&host).with_policy(policy).run(&workflow).await);
    match err {
        WorkflowError::EndpointResolution {
            step_name,
            permalink,
            ..
        } => {
            assert_eq!(step_name, "A");
            assert_eq!(permalink, "$e/Tag/Missing");
        }
        other => panic!("Unexpected error type: {other}"),
    }
    assert_eq!(host.calls().len(), 1);
}

#[tokio::test]
async fn test_transport_retry_eventual_success() {
    let host = Arc::new(
        MockHost::new()
            .respond("$e/Tag/A", Err(EndpointError::Transport("connection reset".to_string())))
            .respond("$e/Tag/A", Err(EndpointError::Transport("connection reset".to_string()))),
    );
    let workflow = WorkflowDefinition::builder("retry")
        .endpoint("A", "A", EndpointStep::new("$e/Tag/A"))
        .build()
        .expect("valid workflow");

    let policy = RunPolicy::default().with_transport_retry(RetryPolicy::fixed(3, Duration::from_millis(5)));
    let run = assert_ok!(runner(&host).with_policy(policy).run(&workflow).await);

    assert!(run.state().get("A").unwrap().passed);
    assert_eq!(host.calls().len(), 3);
}

#[tokio::test]
async fn test_transport_error_without_retry() {
    let host = Arc::new(
        MockHost::new().respond("$e/Tag/A", Err(EndpointError::Transport("offline".to_string()))),
    );
    let workflow = WorkflowDefinition::builder("transport")
        .endpoint("A", "A", EndpointStep::new("$e/Tag/A"))
        .endpoint("B", "B", EndpointStep::new("$e/Tag/B"))
        .build()
        .expect("valid workflow");

    let err = assert_err!(runner(&host).run(&workflow).await);
    assert_eq!(err.to_string(), "Transport failed in step 'A': offline");
    assert_eq!(err.step_name().map(StepName::as_str), Some("A"));
    assert_eq!(host.calls().len(), 1);
}

#[tokio::test]
async fn test_step_timeout() {
    let host = Arc::new(MockHost::new().with_delay(Duration::from_millis(200)));
    let workflow = WorkflowDefinition::builder("timeout")
        .endpoint("slow", "Slow", EndpointStep::new("$e/Tag/Slow"))
        .build()
        .expect("valid workflow");

    let policy = RunPolicy::default().with_step_timeout(Duration::from_millis(10));
    let err = assert_err!(runner(&host).with_policy(policy).run(&workflow).await);
    match err {
        WorkflowError::Timeout { step_name } => assert_eq!(step_name, "slow"),
        other => panic!("Unexpected error type: {other}"),
    }
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let host = Arc::new(MockHost::new());
    let workflow = WorkflowDefinition::builder("cancel")
        .content("intro", "Intro", "hello")
        .build()
        .expect("valid workflow");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = assert_err!(runner(&host).run_with(&workflow, Config::new(), &cancel).await);
    match err {
        WorkflowError::Cancelled { step_name } => assert_eq!(step_name, "intro"),
        other => panic!("Unexpected error type: {other}"),
    }
    assert!(host.displayed().is_empty());
}

#[tokio::test]
async fn test_cancelled_between_steps() {
    let host = Arc::new(MockHost::new());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let workflow = WorkflowDefinition::builder("cancel-mid")
        .add_step(
            StepDefinition::content("A", "A", "a").update_config(move |config: Config, _: &StepStateMap| {
                trigger.cancel();
                Ok(config)
            }),
        )
        .content("B", "B", "b")
        .build()
        .expect("valid workflow");

    let err = assert_err!(runner(&host).run_with(&workflow, Config::new(), &cancel).await);
    match err {
        WorkflowError::Cancelled { step_name } => assert_eq!(step_name, "B"),
        other => panic!("Unexpected error type: {other}"),
    }
    assert_eq!(host.displayed(), vec!["a".to_string()]);
}

#[tokio::test]
async fn test_cancel_during_retry_backoff() {
    let host = Arc::new(
        MockHost::new().respond("$e/Tag/A", Err(EndpointError::Transport("down".to_string()))),
    );
    let workflow = WorkflowDefinition::builder("cancel-retry")
        .endpoint("A", "A", EndpointStep::new("$e/Tag/A"))
        .build()
        .expect("valid workflow");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let policy = RunPolicy::default().with_transport_retry(RetryPolicy::fixed(1, Duration::from_secs(30)));
    let err = assert_err!(
        runner(&host)
            .with_policy(policy)
            .run_with(&workflow, Config::new(), &cancel)
            .await
    );
    assert!(matches!(err, WorkflowError::Cancelled { .. }));
    assert_eq!(host.calls().len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let counter = Arc::new(AtomicU32::new(0));
    let host = Arc::new(MockHost::new());
    let workflow = Arc::new(
        WorkflowDefinition::builder("concurrent")
            .add_step({
                let counter = Arc::clone(&counter);
                StepDefinition::content("A", "A", "a").update_config(move |config: Config, _: &StepStateMap| {
                    let run = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(config.with_param("run", run))
                })
            })
            .endpoint("B", "B", EndpointStep::new("$e/Tag/B"))
            .build()
            .expect("valid workflow"),
    );
    let runner = runner(&host);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let runner = runner.clone();
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move { runner.run(&workflow).await })
        })
        .collect();

    let mut seen = Vec::new();
    for handle in handles {
        let run = assert_ok!(handle.await.expect("task panicked"));
        assert_eq!(run.state().len(), 2);
        seen.push(run.config().param("run").and_then(|v| v.as_u64()).unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_compiled_document_runs() {
    let openapi = json!({
        "paths": {
            "/user/login": {"get": {"operationId": "loginUser", "tags": ["user"]}},
            "/pet/findByStatus": {"get": {"operationId": "findPetsByStatus", "tags": ["pet"]}}
        }
    });
    let document = walkthrough::WalkthroughDocument::from_json(
        r#"{"workflows": [{
            "workflowId": "loginUserAndRetrievePet",
            "steps": [
                {
                    "stepId": "loginStep",
                    "operationId": "loginUser",
                    "parameters": [{"name": "username", "in": "query", "value": "user1"}],
                    "outputs": {"sessionToken": "$response.body"}
                },
                {
                    "stepId": "getPetStep",
                    "operationId": "findPetsByStatus",
                    "parameters": [
                        {"name": "status", "in": "query", "value": "available"},
                        {"name": "Authorization", "in": "header", "value": "$steps.loginStep.outputs.sessionToken"}
                    ]
                }
            ]
        }]}"#,
    )
    .expect("valid document");
    let index = walkthrough::PermalinkIndex::from_openapi(&openapi);
    let workflow = document
        .compile("loginUserAndRetrievePet", &index)
        .expect("compiles");
    assert!(matches!(
        workflow.steps()[0].kind(),
        StepKind::Endpoint(endpoint) if endpoint.permalink() == "$e/user/loginUser"
    ));

    let host = Arc::new(MockHost::new().respond(
        "$e/user/loginUser",
        Ok(Response::new(200).with_body(json!("token-123"))),
    ));
    let run = assert_ok!(runner(&host).run(&workflow).await);

    assert!(run.all_passed());
    let calls = host.calls();
    assert_eq!(calls[0].args.get(ParamLocation::Query, "username"), Some(&json!("user1")));
    assert_eq!(calls[1].permalink, "$e/pet/findPetsByStatus");
    assert_eq!(calls[1].config.param("Authorization"), Some(&json!("token-123")));
    assert_eq!(run.config().param("Authorization"), Some(&json!("token-123")));
}
