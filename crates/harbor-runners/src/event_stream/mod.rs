//! Event stream publish and verification.
//!
//! A run either talks to a real publish endpoint ([`RealMode`]) or, when no
//! endpoint and token are supplied, fabricates the event trace in memory
//! ([`SimulatedMode`]). Both share payload preparation, the payload check and
//! the optional ordering check.

/// Message preparation and wire encoding.
pub mod payload;
/// Publishing over HTTP with optional consumer verification.
pub mod real;
/// In-memory event traces.
pub mod simulated;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::environment::RunEnvironment;
use crate::runner::TestRunner;
use harbor_client::HttpTransport;
use harbor_core::extract::is_truthy;
use harbor_core::{
    AssertionResult, Error, EventRecord, EventStreamPayload, EventStreamSpec, Result,
    RunId, RunStatus, TestKind, TestPayload, TestResult,
};
pub use payload::{EncodedMessage, encode, expand_template, prepare_payload};
pub use real::RealMode;
pub use simulated::SimulatedMode;

const DEFAULT_NAME: &str = "Event Stream Test";

/// State accumulated while one event stream run progresses.
pub struct EventRun<'run> {
    /// Input being run.
    pub spec: &'run EventStreamSpec,
    /// Prepared message payload.
    pub message: Value,
    /// Progress handle.
    pub status: &'run RunStatus,
    /// Events and captures recorded so far.
    pub trace: EventStreamPayload,
    /// Checks in evaluation order.
    pub assertions: Vec<AssertionResult>,
}

impl<'run> EventRun<'run> {
    /// Starts a run with an empty trace.
    pub fn new(spec: &'run EventStreamSpec, message: Value, status: &'run RunStatus) -> Self {
        Self {
            spec,
            message,
            status,
            trace: EventStreamPayload::new(spec.test_type, spec.event_type, spec.api_url.clone()),
            assertions: Vec::new(),
        }
    }

    /// Appends an event to the trace.
    pub fn record(&mut self, event: EventRecord) {
        self.trace.events.push(event);
    }

    /// Appends a check.
    pub fn assert(&mut self, assertion: AssertionResult) {
        self.assertions.push(assertion);
    }

    /// Topic for published events: the configured topic or the last URL segment.
    pub fn outbound_topic(&self) -> Option<String> {
        self.spec.topic.clone().or_else(|| {
            self.spec
                .api_url
                .as_deref()
                .and_then(|url| url.trim().rsplit('/').next())
                .map(str::to_owned)
        })
    }
}

/// One way of exercising an event stream.
#[async_trait]
pub trait EventStreamMode: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// Publishes (or simulates) the prepared message, recording events and checks.
    ///
    /// # Errors
    /// Returns an error when the publish call itself fails; checks already
    /// recorded on `run` are kept.
    async fn exercise(&self, run: &mut EventRun<'_>) -> Result<()>;
}

/// Picks the real mode when an endpoint and token are present.
pub fn select_mode(
    spec: &EventStreamSpec,
    transport: &Arc<dyn HttpTransport>,
) -> Box<dyn EventStreamMode> {
    match spec.real_endpoint() {
        Some((url, token)) => Box::new(RealMode::new(Arc::clone(transport), url, token)),
        None => Box::new(SimulatedMode),
    }
}

/// Runs [`EventStreamSpec`]s.
pub struct EventStreamRunner {
    env: RunEnvironment,
}

impl EventStreamRunner {
    /// Creates a runner over the given environment.
    pub fn new(env: RunEnvironment) -> Self {
        Self { env }
    }

    async fn execute(&self, run: &mut EventRun<'_>) -> Result<()> {
        let has_topic = run.spec.topic.as_deref().is_some_and(|topic| !topic.trim().is_empty());
        let has_url = run.spec.api_url.as_deref().is_some_and(|url| !url.trim().is_empty());
        if !has_topic && !has_url {
            return Err(Error::Config("Either topic or apiUrl is required".to_owned()));
        }

        run.assert(AssertionResult::new(
            "Valid Payload",
            "validation",
            !run.message.is_null(),
            "Non-empty payload",
            if is_truthy(&run.message) { "Valid" } else { "Empty" },
        ));

        let mode = select_mode(run.spec, &self.env.transport);
        tracing::info!("Event stream test in {} mode", mode.label());
        mode.exercise(run).await?;

        if run.spec.options.test_event_ordering && run.trace.events.len() > 1 {
            let in_order = chronological(&run.trace.events);
            run.assert(AssertionResult::new(
                "Event Ordering",
                "ordering",
                in_order,
                "Chronological order",
                if in_order { "Correct order" } else { "Out of order" },
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TestRunner for EventStreamRunner {
    type Spec = EventStreamSpec;

    fn run_prefix(&self) -> &'static str {
        "event-test"
    }

    async fn run_with_id(&self, spec: &EventStreamSpec, run_id: RunId) -> TestResult {
        let started = Instant::now();
        let status = self.env.registry.start(run_id.clone(), "Initializing event stream test...");
        let mut run = EventRun::new(spec, prepare_payload(spec.payload.as_ref()), &status);
        let mut result = TestResult::new(
            spec.name.as_deref().unwrap_or(DEFAULT_NAME),
            TestKind::EventStream,
            run_id,
            TestPayload::EventStream(run.trace.clone()),
        );

        let outcome = self.execute(&mut run).await;
        result.assertions = run.assertions;
        match outcome {
            Ok(()) => result.conclude(started),
            Err(error) => {
                tracing::error!("Event stream test failed: {error}");
                result.fail(error, started);
            }
        }

        result.payload = TestPayload::EventStream(run.trace);
        result
    }
}

/// Whether event timestamps never decrease.
pub fn chronological(events: &[EventRecord]) -> bool {
    events
        .windows(2)
        .all(|pair| pair[1].timestamp >= pair[0].timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use harbor_core::Direction;
    use serde_json::json;

    #[test]
    fn test_chronological_detects_reordering() {
        let first = EventRecord::new(Direction::Outbound, None, json!({}));
        let mut second = EventRecord::new(Direction::Inbound, None, json!({}));
        assert!(chronological(&[first.clone(), second.clone()]));

        second.timestamp = first.timestamp - Duration::seconds(1);
        assert!(!chronological(&[first, second]));
    }

    #[test]
    fn test_outbound_topic_falls_back_to_url_segment() {
        let registry = harbor_core::StatusRegistry::new();
        let status = registry.start(RunId::from("event-test-1"), "start");
        let spec: EventStreamSpec =
            serde_json::from_value(json!({"apiUrl": "https://events.test/rest/singlemsg/Orders"}))
                .unwrap();
        let run = EventRun::new(&spec, Value::Null, &status);
        assert_eq!(run.outbound_topic().as_deref(), Some("Orders"));
    }
}
