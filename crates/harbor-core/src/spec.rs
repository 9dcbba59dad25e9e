//! Test specifications accepted by the runners.
//!
//! Field names follow the JSON shape submitted by the dashboard, so every
//! struct is `camelCase` on the wire. Several fields accept either a JSON
//! value or a string holding JSON; [`decode_embedded`] normalizes those.

use core::result::Result as CoreResult;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, from_str, from_value};
use std::collections::BTreeMap;

use crate::assertion::Assertion;
use crate::error::{Error, Result};

/// A request to run exactly one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TestSpecification {
    /// Single HTTP request with assertions.
    #[serde(rename = "webservice")]
    WebService(WebServiceSpec),
    /// Process execution polled to completion.
    #[serde(rename = "schedule")]
    ScheduledJob(ScheduledJobSpec),
    /// Event stream publish/verify.
    #[serde(rename = "event")]
    EventStream(EventStreamSpec),
    /// Agent prompt/response check.
    #[serde(rename = "agent")]
    Agent(AgentSpec),
}

/// Authentication attached to a web service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthSpec {
    /// HTTP basic authentication.
    Basic {
        /// User name.
        #[serde(default)]
        username: Option<String>,
        /// Password.
        #[serde(default)]
        password: Option<String>,
    },
    /// Bearer token.
    Bearer {
        /// Token without the `Bearer ` prefix.
        #[serde(default)]
        token: Option<String>,
    },
    /// API key in a named header.
    #[serde(rename = "apikey")]
    ApiKey {
        /// Key value.
        #[serde(default)]
        key: Option<String>,
        /// Header carrying the key, `X-API-Key` when absent.
        #[serde(default, rename = "headerName")]
        header_name: Option<String>,
    },
    /// Any other auth type is ignored.
    #[serde(other)]
    Unsupported,
}

/// Web service test input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebServiceSpec {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Target URL.
    pub endpoint: String,
    /// HTTP method.
    #[serde(default = "default_get")]
    pub method: String,
    /// Extra headers, as an object or a JSON string.
    #[serde(default)]
    pub headers: Option<Value>,
    /// Request body, sent for POST/PUT/PATCH only.
    #[serde(default)]
    pub body: Option<Value>,
    /// Expected status code, as a number or a string.
    #[serde(default)]
    pub expected_status: Option<Value>,
    /// Timeout in milliseconds.
    #[serde(default = "default_request_timeout", deserialize_with = "request_timeout")]
    pub timeout: u64,
    /// Assertions evaluated against the response.
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<AuthSpec>,
}

/// Options for scheduled job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobOptions {
    /// Fetch execution logs once the job finishes.
    #[serde(default)]
    pub capture_execution_logs: bool,
}

/// Scheduled job test input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobSpec {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Process to execute.
    pub process_id: String,
    /// Runtime to execute on, defaults to the configured atom.
    #[serde(default)]
    pub atom_id: Option<String>,
    /// Process properties, as an object or a JSON string.
    #[serde(default)]
    pub input_data: Option<Value>,
    /// Expected output descriptor, as an object or a JSON string.
    #[serde(default)]
    pub expected_output: Option<Value>,
    /// Timeout in milliseconds.
    #[serde(default = "default_job_timeout", deserialize_with = "job_timeout")]
    pub timeout: u64,
    /// Extra behaviour.
    #[serde(default)]
    pub options: ScheduledJobOptions,
}

/// Expected output checks for a scheduled job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutput {
    /// Numeric directive compared to the outbound document count.
    #[serde(default)]
    pub records_processed: Option<Value>,
    /// Exact error document count.
    #[serde(default)]
    pub error_count: Option<i64>,
    /// Upper bound on execution duration in milliseconds.
    #[serde(default)]
    pub max_duration: Option<i64>,
}

/// Event stream test flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventTestType {
    /// Publish only.
    #[default]
    Publish,
    /// Publish, then read back through a consumer endpoint.
    PublishVerify,
    /// Publish and expect a downstream round trip.
    Roundtrip,
}

impl EventTestType {
    /// Whether this flavour reads back through a consumer endpoint.
    pub fn verifies(self) -> bool {
        matches!(self, Self::PublishVerify | Self::Roundtrip)
    }
}

/// Event flavour used in simulated mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatedEventType {
    /// Outbound event.
    #[default]
    Publish,
    /// Inbound event.
    Subscribe,
    /// Outbound trigger expecting inbound results.
    Roundtrip,
}

/// Wire encoding for published messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Payload sent verbatim, properties as headers.
    #[default]
    Single,
    /// Payload wrapped in a `messages` envelope.
    Multiple,
}

impl MessageFormat {
    /// Lower-case name as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
        }
    }
}

/// Options for event stream runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamOptions {
    /// Upper bound for the publish response time.
    #[serde(default, deserialize_with = "optional_millis")]
    pub max_response_time: Option<u64>,
    /// Check that recorded events are in chronological order.
    #[serde(default)]
    pub test_event_ordering: bool,
}

/// An event the caller expects to observe (simulated mode).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedEvent {
    /// Topic the event should appear on.
    #[serde(default)]
    pub topic: Option<String>,
    /// Content the event should contain.
    #[serde(default)]
    pub contains: Option<Value>,
    /// Full expected payload.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Event stream test input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamSpec {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Publish URL.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Environment token for bearer auth.
    #[serde(default)]
    pub env_token: Option<String>,
    /// Test flavour.
    #[serde(default)]
    pub test_type: EventTestType,
    /// Consumer endpoint used for verification.
    #[serde(default)]
    pub consumer_endpoint: Option<String>,
    /// Consumer credential, raw `user:pass` or a prefixed header value.
    #[serde(default)]
    pub consumer_api_key: Option<String>,
    /// Delay before verification in milliseconds; zero means the default.
    #[serde(default = "default_verify_delay", deserialize_with = "verify_delay")]
    pub verify_delay: u64,
    /// Text the consumed message must contain.
    #[serde(default)]
    pub expected_in_message: Option<String>,
    /// Stream name (informational).
    #[serde(default)]
    pub stream_name: Option<String>,
    /// Simulated event flavour.
    #[serde(default)]
    pub event_type: SimulatedEventType,
    /// Topic name.
    #[serde(default)]
    pub topic: Option<String>,
    /// Message payload; strings are template-expanded.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Expected events (simulated mode), as an array or a JSON string.
    #[serde(default)]
    pub expected_events: Option<Value>,
    /// Timeout in milliseconds.
    #[serde(default = "default_request_timeout", deserialize_with = "request_timeout")]
    pub timeout: u64,
    /// Partition key.
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Wire encoding.
    #[serde(default)]
    pub message_format: MessageFormat,
    /// Custom message properties, as an object or a JSON string.
    #[serde(default)]
    pub message_properties: Option<Value>,
    /// Extra behaviour.
    #[serde(default)]
    pub options: EventStreamOptions,
}

impl EventStreamSpec {
    /// Returns the publish URL and token when both are present.
    pub fn real_endpoint(&self) -> Option<(&str, &str)> {
        let url = self.api_url.as_deref().filter(|url| !url.trim().is_empty())?;
        let token = self.env_token.as_deref().filter(|token| !token.is_empty())?;
        Some((url, token))
    }
}

/// How an agent is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Direct web service call.
    #[default]
    Api,
    /// Platform process execution.
    Process,
}

/// Authentication for agent API calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentAuthType {
    /// Username and password.
    #[default]
    Basic,
    /// API key as a bearer token.
    Bearer,
    /// No authentication.
    #[serde(rename = "none")]
    Anonymous,
}

/// Options for agent runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOptions {
    /// Attach the execution record to the result.
    #[serde(default)]
    pub capture_trace: bool,
}

/// Agent test input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Invocation mode.
    #[serde(default)]
    pub test_type: AgentMode,
    /// Agent URL (API mode).
    #[serde(default)]
    pub agent_endpoint: Option<String>,
    /// Authentication scheme (API mode).
    #[serde(default)]
    pub auth_type: AgentAuthType,
    /// Basic auth user name.
    #[serde(default)]
    pub auth_username: Option<String>,
    /// Basic auth password.
    #[serde(default)]
    pub auth_password: Option<String>,
    /// Bearer key.
    #[serde(default)]
    pub agent_api_key: Option<String>,
    /// HTTP method (API mode).
    #[serde(default = "default_post")]
    pub http_method: String,
    /// Request body template with `{{prompt}}` and `{{history}}` tokens.
    #[serde(default)]
    pub request_body_template: Option<String>,
    /// Process to execute (process mode).
    #[serde(default)]
    pub process_id: Option<String>,
    /// Runtime to execute on (process mode).
    #[serde(default)]
    pub atom_id: Option<String>,
    /// Prompt sent to the agent.
    pub prompt: String,
    /// Expected behaviour, as an object or a JSON string.
    #[serde(default)]
    pub expected_behavior: Option<Value>,
    /// Timeout in milliseconds.
    #[serde(default = "default_job_timeout", deserialize_with = "job_timeout")]
    pub timeout: u64,
    /// Prior turns, as an array or a JSON string.
    #[serde(default)]
    pub conversation_history: Option<Value>,
    /// Extra behaviour.
    #[serde(default)]
    pub options: AgentOptions,
}

/// What an agent answer must (not) contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedBehavior {
    /// Terms that must appear, case-insensitively.
    #[serde(default)]
    pub should_contain: Vec<String>,
    /// Terms that must not appear, case-insensitively.
    #[serde(default)]
    pub should_not_contain: Vec<String>,
    /// Upper bound for the response time.
    #[serde(default, deserialize_with = "optional_millis")]
    pub max_response_time: Option<u64>,
}

/// Decodes a field that may hold either JSON or a string containing JSON.
///
/// # Errors
/// Returns an error when a string value is not valid JSON.
pub fn decode_embedded(value: &Value) -> Result<Value> {
    match value {
        Value::String(text) => Ok(from_str(text)?),
        other => Ok(other.clone()),
    }
}

/// Decodes an optional embedded object into a string-valued property map.
///
/// # Errors
/// Returns an error when the value is not JSON or not an object.
pub fn decode_properties(value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    match decode_embedded(value)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, entry)| (key, render(&entry)))
            .collect()),
        Value::Null => Ok(BTreeMap::new()),
        _ => Err(Error::Config(
            "Input data must be a JSON object of property names to values".to_owned(),
        )),
    }
}

/// Decodes message properties, falling back to an empty map on bad input.
pub fn decode_message_properties(value: Option<&Value>) -> Map<String, Value> {
    match value.map(decode_embedded) {
        Some(Ok(Value::Object(map))) => map,
        _ => Map::new(),
    }
}

/// Decodes an optional descriptor into `T`, treating absence as default.
///
/// # Errors
/// Returns an error when the value does not decode into `T`.
pub fn decode_descriptor<T: DeserializeOwned>(value: Option<&Value>) -> Result<Option<T>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let decoded = decode_embedded(raw)?;
    Ok(Some(from_value(decoded)?))
}

/// Renders a JSON value the way it appears inside text: strings unquoted.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn default_get() -> String {
    "GET".to_owned()
}

fn default_post() -> String {
    "POST".to_owned()
}

/// Timeout for single HTTP calls when the spec gives none.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Timeout for process executions when the spec gives none.
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 60_000;
/// Wait before reading back through a consumer endpoint.
pub const DEFAULT_VERIFY_DELAY_MS: u64 = 2_000;

const fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

const fn default_job_timeout() -> u64 {
    DEFAULT_JOB_TIMEOUT_MS
}

const fn default_verify_delay() -> u64 {
    DEFAULT_VERIFY_DELAY_MS
}

/// Reads a millisecond count sent as a number or as a string.
///
/// Strings are read up to the first non-digit, so `"2500"` and `"2500ms"`
/// both give 2500. Negative, fractional-only and non-numeric input yields
/// `None`.
pub fn lenient_millis(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|millis| millis.is_finite() && *millis >= 0.0)
                .map(|millis| millis.trunc() as u64)
        }),
        Value::String(text) => leading_integer(text),
        _ => None,
    }
}

fn leading_integer(text: &str) -> Option<u64> {
    let trimmed = text.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = unsigned
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned.get(..end)?.parse().ok()
}

fn request_timeout<'de, D: Deserializer<'de>>(deserializer: D) -> CoreResult<u64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(lenient_millis(&raw).unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
}

fn job_timeout<'de, D: Deserializer<'de>>(deserializer: D) -> CoreResult<u64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(lenient_millis(&raw).unwrap_or(DEFAULT_JOB_TIMEOUT_MS))
}

fn verify_delay<'de, D: Deserializer<'de>>(deserializer: D) -> CoreResult<u64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(lenient_millis(&raw)
        .filter(|delay| *delay > 0)
        .unwrap_or(DEFAULT_VERIFY_DELAY_MS))
}

fn optional_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> CoreResult<Option<u64>, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(lenient_millis(&raw))
}
