//! Integration tests for the web service, scheduled job and agent runners.
//!
//! Every run goes through scripted doubles: `MockTransport` for direct HTTP
//! and `MockPlatform` for process executions. Poll loops run on paused time.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::print_stdout,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use futures::future::join_all;
use harbor_client::{HttpResponse, MockPlatform, MockReply, MockTransport};
use harbor_core::{
    AgentPayload, Phase, RunId, ScheduledJobPayload, StatusRegistry, TestPayload, TestResult,
    TestSpecification, TestStatus,
};
use harbor_runners::{
    AgentRunner, RunEnvironment, ScheduledJobRunner, TestEngine, TestRunner, WebServiceRunner,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, from_str, from_value, json};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

fn environment(transport: &MockTransport, platform: &MockPlatform) -> RunEnvironment {
    RunEnvironment::new(
        StatusRegistry::new(),
        Arc::new(transport.clone()),
        Arc::new(platform.clone()),
    )
}

fn spec<T: DeserializeOwned>(value: Value) -> T {
    from_value(value).unwrap()
}

fn names(result: &TestResult) -> Vec<&str> {
    result.assertions.iter().map(|assertion| assertion.name.as_str()).collect()
}

fn job_payload(result: &TestResult) -> &ScheduledJobPayload {
    let TestPayload::ScheduledJob(payload) = &result.payload else {
        panic!("expected scheduled job payload");
    };
    payload
}

fn agent_payload(result: &TestResult) -> &AgentPayload {
    let TestPayload::Agent(payload) = &result.payload else {
        panic!("expected agent payload");
    };
    payload
}

#[tokio::test]
async fn test_web_service_status_mismatch_is_single_failure() {
    let transport = MockTransport::new().with_response(
        "api.test/orders",
        HttpResponse::json_body(404, &json!({"error": "missing"})),
    );
    let env = environment(&transport, &MockPlatform::new());
    let runner = WebServiceRunner::new(env.clone());

    let result = runner
        .run(&spec(json!({"endpoint": "https://api.test/orders", "expectedStatus": "200"})))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.is_none());
    assert_eq!(result.assertions.len(), 1);
    let status_check = &result.assertions[0];
    assert_eq!(status_check.name, "Status Code");
    assert!(!status_check.passed);
    assert_eq!(status_check.actual, json!(404));
    assert!(env.registry.is_empty());
}

#[tokio::test]
async fn test_web_service_assertions_pass() {
    let transport = MockTransport::new().with_response(
        "api.test/orders/7",
        HttpResponse::json_body(200, &json!({"order": {"id": 7, "state": "open"}}))
            .with_header("X-Request-Id", "r-1"),
    );
    let runner = WebServiceRunner::new(environment(&transport, &MockPlatform::new()));

    let result = runner
        .run(&spec(json!({
            "name": "Get order",
            "endpoint": "https://api.test/orders/7",
            "expectedStatus": 200,
            "auth": {"type": "basic", "username": "user", "password": "pass"},
            "assertions": [
                {"type": "jsonPath", "path": "$.order.id", "operator": "equals", "expected": 7},
                {"type": "header", "path": "x-request-id", "operator": "exists"},
                {"type": "responseTime", "operator": "lessThan", "expected": 5000}
            ]
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    assert_eq!(result.test_name, "Get order");
    assert!(result.test_id.as_str().starts_with("webservice-test-"));
    assert_eq!(result.assertions.len(), 4);

    let request = &transport.requests()[0];
    assert_eq!(request.header("authorization"), Some("Basic dXNlcjpwYXNz"));
    assert!(request.body.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_web_service_timeout() {
    let transport = MockTransport::new().with_reply("slow.test", MockReply::Hang);
    let env = environment(&transport, &MockPlatform::new());
    let runner = WebServiceRunner::new(env.clone());

    let result = runner
        .run(&spec(json!({"endpoint": "https://slow.test", "timeout": 100})))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("Request timed out"));
    assert!(result.assertions.is_empty());
    assert!(env.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_web_service_timeout_given_as_string() {
    let transport = MockTransport::new().with_reply("slow.test", MockReply::Hang);
    let runner = WebServiceRunner::new(environment(&transport, &MockPlatform::new()));

    let result = runner
        .run(&spec(json!({"endpoint": "https://slow.test", "timeout": "250"})))
        .await;

    assert_eq!(result.error.as_deref(), Some("Request timed out"));
}

#[tokio::test]
async fn test_web_service_transport_failure_keeps_message() {
    let transport =
        MockTransport::new().with_reply("down.test", MockReply::Fail("connection refused".to_owned()));
    let runner = WebServiceRunner::new(environment(&transport, &MockPlatform::new()));

    let result = runner.run(&spec(json!({"endpoint": "https://down.test"}))).await;
    assert_eq!(result.error.as_deref(), Some("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_job_stops_after_poll_budget() {
    let platform = MockPlatform::new()
        .with_default_atom("atom-1")
        .with_poll(json!({"status": "INPROCESS"}));
    let env = environment(&MockTransport::new(), &platform);
    let runner = ScheduledJobRunner::new(env.clone());

    let result = runner
        .run(&spec(json!({"processId": "proc-1", "timeout": 5000})))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("Execution timed out after 5000ms. Last status: INPROCESS")
    );
    assert_eq!(platform.poll_count(), 3);
    assert_eq!(job_payload(&result).execution_id.as_deref(), Some("exec-1"));
    assert!(env.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_job_completes_with_expected_output() {
    let platform = MockPlatform::new()
        .with_default_atom("atom-1")
        .with_poll(json!({"status": "INPROCESS"}))
        .with_poll(json!({
            "status": "COMPLETE",
            "executionId": "exec-1",
            "executionDuration": ["Long", 900],
            "inboundDocumentCount": 3,
            "outboundDocumentCount": 12,
            "errorDocumentCount": 0
        }))
        .with_logs("2026-01-01 INFO done");
    let runner = ScheduledJobRunner::new(environment(&MockTransport::new(), &platform));

    let result = runner
        .run(&spec(json!({
            "processId": "proc-1",
            "inputData": "{\"batch\": 42}",
            "expectedOutput": {"recordsProcessed": ">=10", "errorCount": 0, "maxDuration": 1000},
            "options": {"captureExecutionLogs": true}
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    assert_eq!(
        names(&result),
        ["Process Status", "Records Processed", "Error Count", "Max Duration"]
    );
    assert_eq!(platform.poll_count(), 2);

    let payload = job_payload(&result);
    assert_eq!(payload.logs.as_deref(), Some("2026-01-01 INFO done"));
    let output = payload.output.as_ref().unwrap();
    assert_eq!(output.outbound_document_count, 12);
    assert_eq!(output.execution_duration, Some(900));

    let executions = platform.executions();
    assert_eq!(executions[0].atom_id, "atom-1");
    assert_eq!(executions[0].properties["batch"], "42");
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_job_poll_errors_are_retried() {
    let platform = MockPlatform::new()
        .with_default_atom("atom-1")
        .with_poll_error("temporarily unavailable")
        .with_poll(json!({"status": "ERROR", "message": "Connector failed"}));
    let runner = ScheduledJobRunner::new(environment(&MockTransport::new(), &platform));

    let result = runner.run(&spec(json!({"processId": "proc-1"}))).await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.is_none());
    assert_eq!(result.assertions[0].actual, json!("ERROR"));
    assert_eq!(platform.poll_count(), 2);
}

#[tokio::test]
async fn test_scheduled_job_requires_credentials() {
    let platform = MockPlatform::new().unconfigured();
    let runner = ScheduledJobRunner::new(environment(&MockTransport::new(), &platform));

    let result = runner.run(&spec(json!({"processId": "proc-1"}))).await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("BOOMI_ACCOUNT_ID"));
    assert!(platform.executions().is_empty());
}

#[tokio::test]
async fn test_scheduled_job_requires_atom() {
    let platform = MockPlatform::new();
    let runner = ScheduledJobRunner::new(environment(&MockTransport::new(), &platform));

    let result = runner.run(&spec(json!({"processId": "proc-1"}))).await;

    assert!(result.error.as_deref().unwrap().starts_with("Atom ID is required"));
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_agent_api_mode() {
    let transport = MockTransport::new().with_response(
        "agent.test/chat",
        HttpResponse::json_body(200, &json!({"answer": "Your refund was approved"})),
    );
    let runner = AgentRunner::new(environment(&transport, &MockPlatform::new()));

    let result = runner
        .run(&spec(json!({
            "prompt": "Where is my \"refund\"?",
            "agentEndpoint": "https://agent.test/chat",
            "authType": "bearer",
            "agentApiKey": "key-1",
            "expectedBehavior": {"shouldContain": ["REFUND"], "shouldNotContain": ["error"]}
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    assert_eq!(
        names(&result),
        [
            "HTTP Status",
            "Response contains \"REFUND\"",
            "Response does NOT contain \"error\"",
            "Agent Responded"
        ]
    );
    let reply = agent_payload(&result).response.as_ref().unwrap();
    assert_eq!(reply.content, "Your refund was approved");
    assert_eq!(reply.status, "success");

    let request = &transport.requests()[0];
    assert_eq!(request.header("authorization"), Some("Bearer key-1"));
    let body: Value = from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["prompt"], json!("Where is my \"refund\"?"));
}

#[tokio::test]
async fn test_agent_api_mode_requires_endpoint() {
    let runner = AgentRunner::new(environment(&MockTransport::new(), &MockPlatform::new()));
    let result = runner.run(&spec(json!({"prompt": "hi"}))).await;
    assert_eq!(result.error.as_deref(), Some("Agent API endpoint URL is required"));
}

#[tokio::test(start_paused = true)]
async fn test_agent_process_mode() {
    let platform = MockPlatform::new().with_default_atom("atom-1").with_poll(json!({
        "status": "COMPLETE",
        "message": "Approved",
        "executionDuration": 1200
    }));
    let runner = AgentRunner::new(environment(&MockTransport::new(), &platform));

    let result = runner
        .run(&spec(json!({
            "testType": "process",
            "processId": "agent-proc",
            "prompt": "Approve order 7",
            "expectedBehavior": "{\"shouldContain\": [\"approved\"], \"maxResponseTime\": 5000}",
            "options": {"captureTrace": true}
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    let payload = agent_payload(&result);
    assert_eq!(payload.execution_id.as_deref(), Some("exec-1"));
    assert_eq!(payload.response.as_ref().unwrap().content, "Approved");
    assert_eq!(payload.trace.as_ref().unwrap()["message"], json!("Approved"));
    assert_eq!(
        platform.executions()[0].properties["agentPrompt"],
        "Approve order 7"
    );
}

#[tokio::test(start_paused = true)]
async fn test_agent_process_timeout() {
    let platform = MockPlatform::new().with_default_atom("atom-1");
    let runner = AgentRunner::new(environment(&MockTransport::new(), &platform));

    let result = runner
        .run(&spec(json!({
            "testType": "process",
            "processId": "agent-proc",
            "prompt": "hello",
            "timeout": 4000
        })))
        .await;

    assert_eq!(result.error.as_deref(), Some("Agent execution timed out after 4000ms"));
    assert_eq!(platform.poll_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_status_is_visible_only_while_running() {
    let transport = MockTransport::new().with_reply(
        "api.test",
        MockReply::Delayed(1_000, HttpResponse::new(200, "ok")),
    );
    let env = environment(&transport, &MockPlatform::new());
    let engine = TestEngine::new(&env);
    let run_id = RunId::from("webservice-test-observed");
    let web: TestSpecification =
        spec(json!({"type": "webservice", "endpoint": "https://api.test"}));

    let observe = async {
        sleep(Duration::from_millis(10)).await;
        env.registry.peek(&run_id)
    };
    let (result, observed) = tokio::join!(engine.run_with_id(&web, run_id.clone()), observe);

    let record = observed.expect("record present while the request is in flight");
    assert_eq!(record.phase, Phase::Executing);
    assert_eq!(result.status, TestStatus::Passed);
    assert!(env.registry.peek(&run_id).is_none());
    assert_eq!(env.registry.peek_or_unknown(&run_id).phase, Phase::Unknown);
}

#[tokio::test]
async fn test_concurrent_runs_leave_registry_empty() {
    let transport = MockTransport::new()
        .with_response("api.test", HttpResponse::new(200, "ok"))
        .with_response("agent.test", HttpResponse::new(500, "boom"));
    let env = environment(&transport, &MockPlatform::new());
    let engine = TestEngine::new(&env);

    let specs: Vec<TestSpecification> = vec![
        spec(json!({"type": "webservice", "endpoint": "https://api.test/a", "expectedStatus": 200})),
        spec(json!({"type": "webservice", "endpoint": "https://api.test/b", "method": "POST", "body": {"x": 1}})),
        spec(json!({"type": "event", "topic": "orders", "payload": {"id": 1}})),
        spec(json!({"type": "agent", "prompt": "hi", "agentEndpoint": "https://agent.test", "authType": "none"})),
        spec(json!({"type": "schedule", "processId": ""})),
    ];

    let results = join_all(specs.iter().map(|spec| engine.run(spec))).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(TestResult::is_terminal));
    assert_eq!(results[0].status, TestStatus::Passed);
    assert_eq!(results[1].status, TestStatus::Passed);
    assert_eq!(results[2].status, TestStatus::Passed);
    assert_eq!(results[3].status, TestStatus::Failed);
    assert_eq!(results[4].error.as_deref(), Some("Process ID is required"));
    assert!(results[4].test_id.as_str().starts_with("job-test-"));
    assert!(env.registry.is_empty());
    assert!(env.registry.active().is_empty());
}
