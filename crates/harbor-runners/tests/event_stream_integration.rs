//! Integration tests for the event stream runner in real and simulated mode.

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

use harbor_client::{HttpResponse, MockPlatform, MockReply, MockTransport};
use harbor_core::{
    Direction, EventStreamPayload, EventStreamSpec, StatusRegistry, TestPayload, TestResult,
    TestStatus,
};
use harbor_runners::{EventStreamRunner, RunEnvironment, TestRunner};
use serde_json::{Value, from_str, from_value, json};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

const PUBLISH_URL: &str = "https://events.test/rest/singlemsg/Orders";

fn runner(transport: &MockTransport) -> (EventStreamRunner, StatusRegistry) {
    let registry = StatusRegistry::new();
    let env = RunEnvironment::new(
        registry.clone(),
        Arc::new(transport.clone()),
        Arc::new(MockPlatform::new()),
    );
    (EventStreamRunner::new(env), registry)
}

fn spec(value: Value) -> EventStreamSpec {
    from_value(value).unwrap()
}

fn trace(result: &TestResult) -> &EventStreamPayload {
    let TestPayload::EventStream(trace) = &result.payload else {
        panic!("expected event stream payload");
    };
    trace
}

fn names(result: &TestResult) -> Vec<&str> {
    result.assertions.iter().map(|assertion| assertion.name.as_str()).collect()
}

#[tokio::test]
async fn test_single_format_publishes_raw_json() {
    let transport = MockTransport::new().with_response(
        "events.test",
        HttpResponse::json_body(200, &json!({"messageId": "m-1"})),
    );
    let (runner, registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({
            "apiUrl": PUBLISH_URL,
            "envToken": "tok",
            "payload": "{\"orderId\": 1}",
            "partitionKey": "p-1",
            "messageProperties": "{\"source\": \"crm\"}"
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    assert_eq!(
        names(&result),
        ["Valid Payload", "HTTP Status", "Message ID Returned", "Message Published"]
    );
    assert_eq!(result.assertions[2].actual, json!("m-1"));

    let request = &transport.requests()[0];
    assert_eq!(request.url, PUBLISH_URL);
    assert_eq!(request.header("authorization"), Some("Bearer tok"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("x-msg-props-source"), Some("crm"));
    assert_eq!(request.header("x-msg-props-partitionKey"), Some("p-1"));
    assert_eq!(request.body.as_deref(), Some("{\"orderId\":1}"));

    let trace = trace(&result);
    assert_eq!(trace.events.len(), 1);
    assert_eq!(trace.events[0].direction, Direction::Outbound);
    assert_eq!(trace.events[0].topic.as_deref(), Some("Orders"));
    let details = trace.request_details.as_ref().unwrap();
    assert!(!details.headers.iter().any(|header| header == "Authorization"));
    assert_eq!(trace.response.as_ref().unwrap().parsed, Some(json!({"messageId": "m-1"})));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_multiple_format_wraps_payload() {
    let transport = MockTransport::new().with_response("events.test", HttpResponse::new(202, ""));
    let (runner, _registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({
            "apiUrl": PUBLISH_URL,
            "envToken": "tok",
            "messageFormat": "multiple",
            "payload": {"orderId": 1}
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed);
    let request = &transport.requests()[0];
    assert_eq!(request.header("content-type"), Some("application/json"));
    let body: Value = from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"messages": [{"payload": "{\"orderId\":1}"}]}));
}

#[tokio::test]
async fn test_rejected_publish_records_error_body() {
    let transport =
        MockTransport::new().with_response("events.test", HttpResponse::new(401, "bad token"));
    let (runner, _registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({"apiUrl": PUBLISH_URL, "envToken": "tok", "payload": "x"})))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.is_none());
    let publish = result.assertions.last().unwrap();
    assert_eq!(publish.name, "Publish Success");
    assert_eq!(publish.actual, json!("Error: bad token"));
    assert_eq!(result.assertions[1].actual, json!("401 Unauthorized"));
}

#[tokio::test(start_paused = true)]
async fn test_publish_timeout_fails_run() {
    let transport = MockTransport::new().with_reply("events.test", MockReply::Hang);
    let (runner, registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({
            "apiUrl": PUBLISH_URL,
            "envToken": "tok",
            "payload": "x",
            "timeout": 250
        })))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("Request timed out after 250ms"));
    assert_eq!(names(&result), ["Valid Payload"]);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_verify_reads_back_through_consumer() {
    let transport = MockTransport::new()
        .with_response("events.test", HttpResponse::new(200, "accepted"))
        .with_response(
            "consumer.test",
            HttpResponse::json_body(200, &json!({"messages": [{"orderId": 1}]})),
        );
    let (runner, _registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({
            "apiUrl": PUBLISH_URL,
            "envToken": "tok",
            "testType": "publish-verify",
            "consumerEndpoint": "https://consumer.test/messages",
            "consumerApiKey": "user:pass",
            "expectedInMessage": "ORDERID",
            "payload": {"orderId": 1},
            "options": {"testEventOrdering": true}
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    assert_eq!(
        names(&result),
        [
            "Valid Payload",
            "HTTP Status",
            "Message Published",
            "Consumer Endpoint Reached",
            "Expected Content Found",
            "Messages Retrieved",
            "Event Ordering"
        ]
    );
    assert_eq!(result.assertions[5].actual, json!("1 message(s)"));

    let consumer_request = &transport.requests()[1];
    assert_eq!(consumer_request.header("authorization"), Some("Basic dXNlcjpwYXNz"));

    let trace = trace(&result);
    assert_eq!(trace.events.len(), 2);
    assert_eq!(trace.events[1].direction, Direction::Inbound);
    assert_eq!(trace.events[1].topic.as_deref(), Some("consumer"));
    assert!(trace.consumer_response.as_ref().unwrap().parsed.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_zero_verify_delay_waits_default() {
    let transport = MockTransport::new()
        .with_response("events.test", HttpResponse::new(200, ""))
        .with_response("consumer.test", HttpResponse::new(200, "[]"));
    let (runner, _registry) = runner(&transport);
    let started = Instant::now();

    let result = runner
        .run(&spec(json!({
            "apiUrl": PUBLISH_URL,
            "envToken": "tok",
            "testType": "publish-verify",
            "consumerEndpoint": "https://consumer.test/messages",
            "verifyDelay": 0,
            "timeout": "5000",
            "payload": "x"
        })))
        .await;

    assert!(started.elapsed() >= Duration::from_millis(2_000));
    assert_eq!(transport.request_count(), 2);
    assert_eq!(names(&result)[3], "Consumer Endpoint Reached");
}

#[tokio::test(start_paused = true)]
async fn test_consumer_failure_is_recorded_as_assertion() {
    let transport = MockTransport::new()
        .with_response("events.test", HttpResponse::new(200, ""))
        .with_reply("consumer.test", MockReply::Fail("connection reset".to_owned()));
    let (runner, _registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({
            "apiUrl": PUBLISH_URL,
            "envToken": "tok",
            "testType": "roundtrip",
            "consumerEndpoint": "https://consumer.test/messages",
            "consumerApiKey": "Bearer abc",
            "payload": "x"
        })))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.is_none());
    let consumer = result.assertions.last().unwrap();
    assert_eq!(consumer.name, "Consumer Endpoint");
    assert_eq!(consumer.actual, json!("Error: connection reset"));
    assert_eq!(transport.requests()[1].header("authorization"), Some("Bearer abc"));
}

#[tokio::test]
async fn test_simulated_roundtrip_echoes_expected_events() {
    let transport = MockTransport::new();
    let (runner, registry) = runner(&transport);

    let result = runner
        .run(&spec(json!({
            "topic": "orders",
            "eventType": "roundtrip",
            "payload": {"orderId": 5},
            "partitionKey": "p-5",
            "expectedEvents": "[{\"topic\": \"orders.done\", \"contains\": {\"status\": \"done\"}}]",
            "options": {"testEventOrdering": true}
        })))
        .await;

    assert_eq!(result.status, TestStatus::Passed, "{:?}", result.assertions);
    assert_eq!(
        names(&result),
        [
            "Valid Payload",
            "Trigger Event Published (Simulated)",
            "Event on orders.done (Simulated)",
            "Mode",
            "Event Ordering"
        ]
    );
    assert_eq!(transport.request_count(), 0);

    let trace = trace(&result);
    assert!(trace.events.iter().all(|event| event.simulated));
    assert_eq!(trace.events[0].partition_key.as_deref(), Some("p-5"));
    assert_eq!(trace.events[1].payload, json!({"status": "done"}));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_simulated_mode_rejects_unreadable_expected_events() {
    let (runner, _registry) = runner(&MockTransport::new());

    let result = runner
        .run(&spec(json!({"topic": "orders", "payload": "x", "expectedEvents": "[oops"})))
        .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.as_deref().unwrap().starts_with("JSON error"));
}

#[tokio::test]
async fn test_topic_or_url_is_required() {
    let (runner, _registry) = runner(&MockTransport::new());
    let result = runner.run(&spec(json!({"payload": "x"}))).await;
    assert_eq!(result.error.as_deref(), Some("Either topic or apiUrl is required"));
    assert!(result.assertions.is_empty());
}
