//! Agent prompt/response checks.
//!
//! An agent is reached either directly over HTTP ([`ApiInvoker`]) or by
//! executing a platform process that wraps it ([`ProcessInvoker`]). Both
//! produce an [`AgentReply`] that is then validated the same way.

/// Direct web service invocation.
pub mod api;
/// Invocation through a platform process execution.
pub mod process;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::environment::RunEnvironment;
use crate::runner::TestRunner;
use harbor_core::spec::decode_descriptor;
use harbor_core::{
    AgentMode, AgentPayload, AgentReply, AgentSpec, AssertionResult, ExpectedBehavior, Phase,
    Result, RunId, RunStatus, TestKind, TestPayload, TestResult, TestStatus,
};
pub use api::ApiInvoker;
pub use process::ProcessInvoker;

const DEFAULT_NAME: &str = "AI Agent Test";

/// What an invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The agent's answer.
    pub reply: AgentReply,
    /// Checks made on the call itself, before content validation.
    pub assertions: Vec<AssertionResult>,
}

/// One way of reaching an agent.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Sends the prompt and waits for the answer.
    ///
    /// Identifiers learned along the way are written to `payload` as soon as
    /// they are known, so they survive a later failure.
    ///
    /// # Errors
    /// Returns an error when the agent cannot be reached or never answers.
    async fn invoke(
        &self,
        spec: &AgentSpec,
        status: &RunStatus,
        payload: &mut AgentPayload,
    ) -> Result<Invocation>;
}

/// Runs [`AgentSpec`]s.
pub struct AgentRunner {
    env: RunEnvironment,
}

impl AgentRunner {
    /// Creates a runner over the given environment.
    pub fn new(env: RunEnvironment) -> Self {
        Self { env }
    }

    fn invoker(&self, mode: AgentMode) -> Box<dyn AgentInvoker> {
        match mode {
            AgentMode::Api => Box::new(ApiInvoker::new(Arc::clone(&self.env.transport))),
            AgentMode::Process => Box::new(ProcessInvoker::new(self.env.clone())),
        }
    }

    async fn execute(
        &self,
        spec: &AgentSpec,
        status: &RunStatus,
        payload: &mut AgentPayload,
    ) -> Result<(AgentReply, Vec<AssertionResult>)> {
        let invocation = self.invoker(spec.test_type).invoke(spec, status, payload).await?;
        payload.response = Some(invocation.reply.clone());

        status.phase(Phase::Validating, "Validating agent response...");
        let behavior = expected_behavior(spec.expected_behavior.as_ref());
        let mut assertions = invocation.assertions;
        assertions.extend(validate(&invocation.reply, &behavior));

        if spec.options.capture_trace {
            payload.trace.clone_from(&invocation.reply.trace);
        }
        Ok((invocation.reply, assertions))
    }
}

#[async_trait]
impl TestRunner for AgentRunner {
    type Spec = AgentSpec;

    fn run_prefix(&self) -> &'static str {
        "agent-test"
    }

    async fn run_with_id(&self, spec: &AgentSpec, run_id: RunId) -> TestResult {
        let started = Instant::now();
        let status = self.env.registry.start(run_id.clone(), "Initializing AI agent test...");
        let mut payload = AgentPayload {
            test_type: spec.test_type,
            prompt: spec.prompt.clone(),
            response: None,
            trace: None,
            execution_id: None,
        };
        let mut result = TestResult::new(
            spec.name.as_deref().unwrap_or(DEFAULT_NAME),
            TestKind::Agent,
            run_id,
            TestPayload::Agent(payload.clone()),
        );

        match self.execute(spec, &status, &mut payload).await {
            Ok((reply, assertions)) => {
                result.assertions = assertions;
                conclude(&mut result, &reply, started);
            }
            Err(error) => {
                tracing::error!("Agent test failed: {error}");
                result.fail(error, started);
            }
        }

        result.payload = TestPayload::Agent(payload);
        result
    }
}

/// Derives the verdict, falling back to the call's own success when there
/// are no checks to go by.
///
/// [`validate`] always adds `Agent Responded`, so results built by
/// [`AgentRunner`] never take the fallback; it only applies to callers that
/// conclude a result with an empty assertion list.
pub fn conclude(result: &mut TestResult, reply: &AgentReply, started: Instant) {
    result.conclude(started);
    if result.assertions.is_empty() {
        result.status = if reply.call_succeeded() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
    }
}

/// Reads the expected behaviour, treating unreadable input as "no expectations".
pub fn expected_behavior(raw: Option<&Value>) -> ExpectedBehavior {
    match decode_descriptor::<ExpectedBehavior>(raw.filter(|value| !value.is_null())) {
        Ok(behavior) => behavior.unwrap_or_default(),
        Err(error) => {
            tracing::warn!("Could not parse expected behavior: {error}");
            ExpectedBehavior::default()
        }
    }
}

/// Content checks shared by every invocation mode.
pub fn validate(reply: &AgentReply, expected: &ExpectedBehavior) -> Vec<AssertionResult> {
    let content = reply.content.to_lowercase();
    let mut assertions = Vec::new();

    for term in &expected.should_contain {
        let found = content.contains(&term.to_lowercase());
        assertions.push(AssertionResult::new(
            format!("Response contains \"{term}\""),
            "contains",
            found,
            term.clone(),
            if found { "Found" } else { "Not found" },
        ));
    }

    for term in &expected.should_not_contain {
        let found = content.contains(&term.to_lowercase());
        assertions.push(AssertionResult::new(
            format!("Response does NOT contain \"{term}\""),
            "notContains",
            !found,
            format!("Not contain: {term}"),
            if found { "Found (FAIL)" } else { "Not found (OK)" },
        ));
    }

    if let (Some(max), Some(elapsed)) = (expected.max_response_time, reply.execution_time) {
        assertions.push(AssertionResult::new(
            "Response Time",
            "timing",
            elapsed <= max,
            format!("<= {max}ms"),
            format!("{elapsed}ms"),
        ));
    }

    let length = reply.content.chars().count();
    assertions.push(AssertionResult::new(
        "Agent Responded",
        "exists",
        length > 0,
        "Non-empty response",
        if length > 0 {
            format!("{length} characters")
        } else {
            "Empty".to_owned()
        },
    ));

    assertions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(content: &str) -> AgentReply {
        AgentReply {
            content: content.to_owned(),
            status: "success".to_owned(),
            status_code: Some(200),
            status_text: Some("OK".to_owned()),
            execution_time: Some(120),
            raw: None,
            trace: None,
        }
    }

    #[test]
    fn test_contains_checks_are_case_insensitive() {
        let expected = ExpectedBehavior {
            should_contain: vec!["Refund".to_owned()],
            should_not_contain: vec!["ERROR".to_owned()],
            max_response_time: Some(100),
        };
        let assertions = validate(&reply("Your refund is on its way"), &expected);
        let names: Vec<_> = assertions.iter().map(|assertion| assertion.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Response contains \"Refund\"",
                "Response does NOT contain \"ERROR\"",
                "Response Time",
                "Agent Responded"
            ]
        );
        assert!(assertions[0].passed);
        assert!(assertions[1].passed);
        assert!(!assertions[2].passed, "120ms exceeds the 100ms bound");
        assert_eq!(assertions[3].actual, json!("25 characters"));
    }

    #[test]
    fn test_empty_reply_fails_responded_check() {
        let assertions = validate(&reply(""), &ExpectedBehavior::default());
        assert_eq!(assertions.len(), 1);
        assert!(!assertions[0].passed);
        assert_eq!(assertions[0].actual, json!("Empty"));
    }

    #[test]
    fn test_unreadable_expected_behavior_is_ignored() {
        assert_eq!(expected_behavior(Some(&json!("{broken"))), ExpectedBehavior::default());
        assert_eq!(expected_behavior(None), ExpectedBehavior::default());
        let parsed = expected_behavior(Some(&json!("{\"shouldContain\": [\"x\"]}")));
        assert_eq!(parsed.should_contain, ["x"]);
    }

    #[test]
    fn test_verdict_falls_back_to_call_status() {
        let mut result = TestResult::new(
            "agent",
            TestKind::Agent,
            RunId::from("agent-test-1"),
            TestPayload::Agent(AgentPayload {
                test_type: AgentMode::Api,
                prompt: String::new(),
                response: None,
                trace: None,
                execution_id: None,
            }),
        );
        let mut failed_call = reply("text");
        failed_call.status = "error".to_owned();
        conclude(&mut result, &failed_call, Instant::now());
        assert_eq!(result.status, TestStatus::Failed);

        conclude(&mut result, &reply("text"), Instant::now());
        assert_eq!(result.status, TestStatus::Passed);
    }

    #[test]
    fn test_validated_results_never_use_call_status() {
        let mut result = TestResult::new(
            "agent",
            TestKind::Agent,
            RunId::from("agent-test-2"),
            TestPayload::Agent(AgentPayload {
                test_type: AgentMode::Api,
                prompt: String::new(),
                response: None,
                trace: None,
                execution_id: None,
            }),
        );
        let empty_success = reply("");
        result.assertions = validate(&empty_success, &ExpectedBehavior::default());
        assert!(!result.assertions.is_empty());
        conclude(&mut result, &empty_success, Instant::now());
        assert_eq!(result.status, TestStatus::Failed);
    }
}
