//! Results produced by runners and the records they carry.

use chrono::{DateTime, Utc};
use core::ops::Not;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::spec::{AgentMode, EventTestType, SimulatedEventType};

/// Assertion kind reserved for results that never affect the verdict.
pub const INFO_KIND: &str = "info";

/// Identifier of a single run, generated when the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh id of the form `{prefix}-{uuid}`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The run has not reached a terminal state.
    Running,
    /// Every non-informational assertion passed.
    Passed,
    /// An assertion failed or the run errored.
    Failed,
}

impl TestStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Which runner produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    /// Single HTTP request against an arbitrary endpoint.
    #[serde(rename = "webservice")]
    WebService,
    /// Process execution on the platform, polled to completion.
    #[serde(rename = "schedule")]
    ScheduledJob,
    /// Publish (and optionally verify) an event stream message.
    #[serde(rename = "event")]
    EventStream,
    /// Prompt an agent and check its answer.
    #[serde(rename = "agent")]
    Agent,
}

/// Outcome of one declarative check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    /// Display name of the check.
    pub name: String,
    /// Category of the check (`status`, `jsonPath`, `info`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Value the check expected.
    pub expected: Value,
    /// Value that was observed.
    pub actual: Value,
}

impl AssertionResult {
    /// Creates a new assertion result.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        passed: bool,
        expected: impl Into<Value>,
        actual: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            passed,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an informational entry that never affects the verdict.
    pub fn info(
        name: impl Into<String>,
        expected: impl Into<Value>,
        actual: impl Into<Value>,
    ) -> Self {
        Self::new(name, INFO_KIND, true, expected, actual)
    }

    /// Returns `true` for informational entries.
    pub fn is_informational(&self) -> bool {
        self.kind == INFO_KIND
    }
}

/// Captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCapture {
    /// Numeric status code.
    pub status: u16,
    /// Canonical reason phrase.
    pub status_text: String,
    /// Response headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Response body, decoded as JSON when the content type says so.
    pub body: Value,
    /// Elapsed milliseconds until the response was read.
    pub response_time: u64,
    /// JSON view of a text body, when it parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
}

/// Payload of a web service run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebServicePayload {
    /// The captured response, absent when the call failed.
    pub response: Option<HttpCapture>,
}

/// Normalized view of a finished platform execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    /// Terminal status reported by the platform.
    pub status: String,
    /// Start time as reported by the platform.
    pub execution_time: Option<Value>,
    /// Duration in milliseconds.
    pub execution_duration: Option<i64>,
    /// Documents received by the process.
    pub inbound_document_count: i64,
    /// Documents emitted by the process.
    pub outbound_document_count: i64,
    /// Documents that errored.
    pub error_document_count: i64,
    /// Platform message, empty when none.
    pub message: String,
}

/// Payload of a scheduled job run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobPayload {
    /// Execution id returned by the platform.
    pub execution_id: Option<String>,
    /// Normalized execution output.
    pub output: Option<JobOutput>,
    /// Execution logs, when requested and available.
    pub logs: Option<String>,
}

/// Direction of a recorded event relative to the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the tool.
    Outbound,
    /// Received by the tool.
    Inbound,
}

/// One event observed during an event stream run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Direction of travel.
    pub direction: Direction,
    /// Topic the event belongs to.
    pub topic: Option<String>,
    /// Event body.
    pub payload: Value,
    /// Partition key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// HTTP status of the call that produced the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Set for events fabricated without network I/O.
    #[serde(skip_serializing_if = "Not::not")]
    pub simulated: bool,
}

impl EventRecord {
    /// Records an event stamped with the current time.
    pub fn new(direction: Direction, topic: Option<String>, payload: Value) -> Self {
        Self {
            direction,
            topic,
            payload,
            partition_key: None,
            timestamp: Utc::now(),
            status: None,
            simulated: false,
        }
    }

    /// Attaches the HTTP status of the call that produced the event.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a partition key.
    #[must_use]
    pub fn with_partition_key(mut self, partition_key: Option<String>) -> Self {
        self.partition_key = partition_key;
        self
    }

    /// Marks the event as fabricated.
    #[must_use]
    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }
}

/// Captured consumer endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerCapture {
    /// Numeric status code.
    pub status: u16,
    /// Canonical reason phrase.
    pub status_text: String,
    /// First kilobyte of the body.
    pub body: String,
    /// JSON view of the body, when it parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
}

/// What was actually sent when publishing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    /// Final URL.
    pub url: String,
    /// Wire format used.
    pub format: String,
    /// Header names, excluding authorization.
    pub headers: Vec<String>,
    /// Body preview, truncated to 500 characters.
    pub body_preview: String,
}

/// Payload of an event stream run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamPayload {
    /// Requested test flavour.
    pub test_type: EventTestType,
    /// Simulated event flavour.
    pub event_type: SimulatedEventType,
    /// Publish URL, when one was configured.
    pub api_url: Option<String>,
    /// Events in the order they were recorded.
    pub events: Vec<EventRecord>,
    /// Publish response.
    pub response: Option<HttpCapture>,
    /// Consumer verification response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_response: Option<ConsumerCapture>,
    /// What was sent on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_details: Option<RequestDetails>,
}

impl EventStreamPayload {
    /// Creates an empty trace for the given flavours.
    pub fn new(
        test_type: EventTestType,
        event_type: SimulatedEventType,
        api_url: Option<String>,
    ) -> Self {
        Self {
            test_type,
            event_type,
            api_url,
            events: Vec::new(),
            response: None,
            consumer_response: None,
            request_details: None,
        }
    }
}

/// The answer an agent produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    /// Extracted textual content.
    pub content: String,
    /// `success`/`error` for API calls, the platform status for processes.
    pub status: String,
    /// HTTP status code (API mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// HTTP reason phrase (API mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Milliseconds the agent took to answer.
    pub execution_time: Option<u64>,
    /// Decoded response body (API mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    /// Full execution record (process mode with trace capture).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
}

impl AgentReply {
    /// Whether the underlying call itself reported success.
    pub fn call_succeeded(&self) -> bool {
        self.status == "success" || self.status == "COMPLETE"
    }
}

/// Payload of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPayload {
    /// Invocation mode.
    pub test_type: AgentMode,
    /// Prompt that was sent.
    pub prompt: String,
    /// Agent answer, absent when the call failed.
    pub response: Option<AgentReply>,
    /// Execution trace, when captured.
    pub trace: Option<Value>,
    /// Platform execution id (process mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

/// Type-specific part of a [`TestResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TestPayload {
    /// Web service capture.
    WebService(WebServicePayload),
    /// Scheduled job output.
    ScheduledJob(ScheduledJobPayload),
    /// Event stream trace.
    EventStream(EventStreamPayload),
    /// Agent answer.
    Agent(AgentPayload),
}

/// The uniform result every runner returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Name of the test.
    pub test_name: String,
    /// Runner that produced the result.
    #[serde(rename = "type")]
    pub kind: TestKind,
    /// Run id used for status tracking.
    pub test_id: RunId,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// Verdict.
    pub status: TestStatus,
    /// Checks in evaluation order.
    pub assertions: Vec<AssertionResult>,
    /// Wall-clock milliseconds for the whole run.
    pub duration: u64,
    /// Human-readable error when the run failed without completing.
    pub error: Option<String>,
    /// Type-specific payload.
    #[serde(flatten)]
    pub payload: TestPayload,
}

impl TestResult {
    /// Creates a result in the `running` state.
    pub fn new(
        test_name: impl Into<String>,
        kind: TestKind,
        test_id: RunId,
        payload: TestPayload,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            kind,
            test_id,
            start_time: Utc::now(),
            status: TestStatus::Running,
            assertions: Vec::default(),
            duration: 0,
            error: None,
            payload,
        }
    }

    /// Returns `true` when every non-informational assertion passed.
    pub fn all_passed(&self) -> bool {
        self.assertions
            .iter()
            .filter(|assertion| !assertion.is_informational())
            .all(|assertion| assertion.passed)
    }

    /// Derives the verdict from the assertions and stamps the duration.
    pub fn conclude(&mut self, started: Instant) {
        self.status = if self.all_passed() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        self.duration = elapsed_ms(started);
    }

    /// Marks the run failed with the given error.
    pub fn fail(&mut self, error: impl fmt::Display, started: Instant) {
        self.status = TestStatus::Failed;
        self.error = Some(error.to_string());
        self.duration = elapsed_ms(started);
    }

    /// Returns `true` once the run reached `passed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        self.status != TestStatus::Running
    }
}

/// Milliseconds elapsed since `started`.
pub fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    fn sample_result() -> TestResult {
        TestResult::new(
            "Sample",
            TestKind::WebService,
            RunId::from("test-1"),
            TestPayload::WebService(WebServicePayload::default()),
        )
    }

    #[test]
    fn test_run_id_generation_uses_prefix() {
        let first = RunId::generate("event-test");
        let second = RunId::generate("event-test");
        assert!(first.as_str().starts_with("event-test-"));
        assert_ne!(first, second, "ids must be unique per run");
    }

    #[test]
    fn test_informational_assertions_do_not_affect_verdict() {
        let mut result = sample_result();
        result.assertions.push(AssertionResult::new(
            "Status",
            "status",
            true,
            "200",
            200u16,
        ));
        result.assertions.push(AssertionResult {
            passed: false,
            ..AssertionResult::info("Mode", "Real API call", "Simulated")
        });
        result.conclude(Instant::now());
        assert_eq!(result.status, TestStatus::Passed);

        result.assertions.push(AssertionResult::new("Body", "jsonPath", false, "a", "b"));
        result.conclude(Instant::now());
        assert_eq!(result.status, TestStatus::Failed);
    }

    #[test]
    fn test_fail_records_error() {
        let mut result = sample_result();
        result.fail("Request timed out", Instant::now());
        assert!(result.is_terminal());
        assert_eq!(result.error.as_deref(), Some("Request timed out"));
    }

    #[test]
    fn test_result_serializes_flat_payload() {
        let result = sample_result();
        let value = to_value(&result).unwrap();
        assert_eq!(value["type"], json!("webservice"));
        assert_eq!(value["testName"], json!("Sample"));
        assert_eq!(value["status"], json!("running"));
        assert!(value.get("response").is_some(), "payload fields are flattened");
        assert!(value.get("payload").is_none());
    }
}
