//! Scripted transport and platform for tests.
//!
//! Both doubles record what they were asked to do so tests can assert on the
//! exact requests a runner produced.

use async_trait::async_trait;
use core::result::Result as CoreResult;
use core::time::Duration;
use serde_json::Value;
use std::collections::VecDeque;
use std::future;
use std::sync::{Arc, Mutex};
use tokio::time::sleep;

use crate::execution::{ExecutionHandle, ExecutionRecord, ExecutionRequest};
use crate::platform::IntegrationPlatform;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use harbor_core::{Error, IgnoreLock as _, Result};

/// What a scripted transport does for a matching request.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer immediately.
    Respond(HttpResponse),
    /// Answer after a delay (use with paused time).
    Delayed(u64, HttpResponse),
    /// Fail with a transport error.
    Fail(String),
    /// Never answer.
    Hang,
}

/// Transport answering from a script keyed by URL substring.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// `(url pattern, reply)` rules, first match wins.
    rules: Arc<Mutex<Vec<(String, MockReply)>>>,
    /// Every request received, in order.
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    /// Creates a transport with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for URLs containing `pattern`.
    #[must_use]
    pub fn with_reply(self, pattern: impl Into<String>, reply: MockReply) -> Self {
        self.rules.lock_ignore_poison().push((pattern.into(), reply));
        self
    }

    /// Adds an immediate response for URLs containing `pattern`.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: HttpResponse) -> Self {
        self.with_reply(pattern, MockReply::Respond(response))
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock_ignore_poison().clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock_ignore_poison().len()
    }

    fn find_reply(&self, url: &str) -> Option<MockReply> {
        self.rules
            .lock_ignore_poison()
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let reply = self.find_reply(&request.url);
        let label = format!("{} {}", request.method, request.url);
        self.requests.lock_ignore_poison().push(request);

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Delayed(delay_ms, response)) => {
                sleep(Duration::from_millis(delay_ms)).await;
                Ok(response)
            }
            Some(MockReply::Fail(message)) => Err(Error::Other(message)),
            Some(MockReply::Hang) => future::pending().await,
            None => Err(Error::Other(format!("No scripted response for {label}"))),
        }
    }
}

/// Scripted outcome of a platform call.
#[derive(Debug, Clone)]
pub enum CallReply {
    /// Successful JSON answer.
    Value(Value),
    /// Remote error with status and message.
    Fail(u16, String),
}

/// One platform call matcher.
#[derive(Debug, Clone)]
struct CallRule {
    endpoint: String,
    body_contains: Option<String>,
    reply: CallReply,
}

/// Platform double with scripted calls, executions and polls.
#[derive(Clone)]
pub struct MockPlatform {
    configured: bool,
    default_atom: Option<String>,
    rules: Arc<Mutex<Vec<CallRule>>>,
    execute_reply: Arc<Mutex<CoreResult<ExecutionHandle, String>>>,
    polls: Arc<Mutex<VecDeque<CoreResult<Value, String>>>>,
    logs: Option<String>,
    /// Log of calls as `METHOD endpoint`, `execute process`, `poll id`, `logs id`.
    calls: Arc<Mutex<Vec<String>>>,
    executions: Arc<Mutex<Vec<ExecutionRequest>>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// Creates a configured platform whose executions start as `exec-1`.
    pub fn new() -> Self {
        let handle = ExecutionHandle {
            execution_id: "exec-1".to_owned(),
            record_url: Some("https://platform.test/record/exec-1".to_owned()),
            raw: Value::Null,
        };
        Self {
            configured: true,
            default_atom: None,
            rules: Arc::default(),
            execute_reply: Arc::new(Mutex::new(Ok(handle))),
            polls: Arc::default(),
            logs: None,
            calls: Arc::default(),
            executions: Arc::default(),
        }
    }

    /// Marks credentials as missing.
    #[must_use]
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Sets the default runtime.
    #[must_use]
    pub fn with_default_atom(mut self, atom_id: impl Into<String>) -> Self {
        self.default_atom = Some(atom_id.into());
        self
    }

    /// Scripts calls to endpoints containing `endpoint`.
    #[must_use]
    pub fn with_call(self, endpoint: impl Into<String>, reply: CallReply) -> Self {
        self.push_rule(endpoint.into(), None, reply)
    }

    /// Scripts calls whose serialized body contains `needle`.
    #[must_use]
    pub fn with_call_matching(
        self,
        endpoint: impl Into<String>,
        needle: impl Into<String>,
        reply: CallReply,
    ) -> Self {
        self.push_rule(endpoint.into(), Some(needle.into()), reply)
    }

    fn push_rule(self, endpoint: String, body_contains: Option<String>, reply: CallReply) -> Self {
        self.rules.lock_ignore_poison().push(CallRule {
            endpoint,
            body_contains,
            reply,
        });
        self
    }

    /// Makes execution requests fail with `message`.
    #[must_use]
    pub fn with_execute_error(self, message: impl Into<String>) -> Self {
        *self.execute_reply.lock_ignore_poison() = Err(message.into());
        self
    }

    /// Queues a polled record. The last queued record repeats.
    #[must_use]
    pub fn with_poll(self, record: Value) -> Self {
        self.polls.lock_ignore_poison().push_back(Ok(record));
        self
    }

    /// Queues a failing poll.
    #[must_use]
    pub fn with_poll_error(self, message: impl Into<String>) -> Self {
        self.polls.lock_ignore_poison().push_back(Err(message.into()));
        self
    }

    /// Sets the logs returned for any execution.
    #[must_use]
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = Some(logs.into());
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock_ignore_poison().clone()
    }

    /// Number of polls made.
    pub fn poll_count(&self) -> usize {
        self.calls
            .lock_ignore_poison()
            .iter()
            .filter(|call| call.starts_with("poll "))
            .count()
    }

    /// Execution requests received.
    pub fn executions(&self) -> Vec<ExecutionRequest> {
        self.executions.lock_ignore_poison().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock_ignore_poison().push(call);
    }
}

#[async_trait]
impl IntegrationPlatform for MockPlatform {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn default_atom_id(&self) -> Option<&str> {
        self.default_atom.as_deref()
    }

    async fn call(&self, endpoint: &str, method: HttpMethod, body: Option<Value>) -> Result<Value> {
        self.record(format!("{method} {endpoint}"));
        let serialized = body.map(|body| body.to_string()).unwrap_or_default();
        let reply = self
            .rules
            .lock_ignore_poison()
            .iter()
            .find(|rule| {
                endpoint.contains(rule.endpoint.as_str())
                    && rule
                        .body_contains
                        .as_deref()
                        .is_none_or(|needle| serialized.contains(needle))
            })
            .map(|rule| rule.reply.clone());

        match reply {
            Some(CallReply::Value(value)) => Ok(value),
            Some(CallReply::Fail(status, message)) => Err(Error::Remote { status, message }),
            None => Err(Error::Other(format!("No scripted call for {method} {endpoint}"))),
        }
    }

    async fn execute_process(&self, request: &ExecutionRequest) -> Result<ExecutionHandle> {
        self.record(format!("execute {}", request.process_id));
        self.executions.lock_ignore_poison().push(request.clone());
        self.execute_reply
            .lock_ignore_poison()
            .clone()
            .map_err(Error::Other)
    }

    async fn poll_execution(&self, handle: &ExecutionHandle) -> Result<ExecutionRecord> {
        self.record(format!("poll {}", handle.execution_id));
        let next = {
            let mut polls = self.polls.lock_ignore_poison();
            if polls.len() > 1 {
                polls.pop_front()
            } else {
                polls.front().cloned()
            }
        };
        match next {
            Some(Ok(record)) => Ok(ExecutionRecord::from_value(record)),
            Some(Err(message)) => Err(Error::Other(message)),
            None => Ok(ExecutionRecord::in_progress()),
        }
    }

    async fn execution_logs(&self, execution_id: &str) -> Option<String> {
        self.record(format!("logs {execution_id}"));
        self.logs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_mock_transport_records_requests() {
        let transport = MockTransport::new()
            .with_response("/ok", HttpResponse::new(200, "fine"));
        let response = transport
            .send(HttpRequest::get("https://example.test/ok"))
            .await
            .unwrap();
        assert_eq!(response.body, "fine");
        transport
            .send(HttpRequest::get("https://example.test/other"))
            .await
            .unwrap_err();
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_platform_poll_sequence_repeats_last() {
        let platform = MockPlatform::new()
            .with_poll(json!({"status": "INPROCESS"}))
            .with_poll(json!({"status": "COMPLETE"}));
        let handle = platform
            .execute_process(&ExecutionRequest::resolve("p", Some("a"), None, BTreeMap::new()).unwrap())
            .await
            .unwrap();

        let statuses: Vec<String> = [
            platform.poll_execution(&handle).await.unwrap(),
            platform.poll_execution(&handle).await.unwrap(),
            platform.poll_execution(&handle).await.unwrap(),
        ]
        .into_iter()
        .map(|record| record.effective_status().to_owned())
        .collect();
        assert_eq!(statuses, ["INPROCESS", "COMPLETE", "COMPLETE"]);
        assert_eq!(platform.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_platform_body_matching() {
        let platform = MockPlatform::new()
            .with_call_matching("/DeployedPackage", "env-bad", CallReply::Fail(400, "rejected".to_owned()))
            .with_call("/DeployedPackage", CallReply::Value(json!({"deploymentId": "d-1"})));
        let good = platform
            .call("/DeployedPackage", HttpMethod::Post, Some(json!({"environmentId": "env-good"})))
            .await
            .unwrap();
        assert_eq!(good["deploymentId"], json!("d-1"));
        let bad = platform
            .call("/DeployedPackage", HttpMethod::Post, Some(json!({"environmentId": "env-bad"})))
            .await
            .unwrap_err();
        assert_eq!(bad.to_string(), "rejected");
    }
}
