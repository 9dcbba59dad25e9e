use async_trait::async_trait;
use serde_json::json;

use super::payload::truncate;
use super::{EventRun, EventStreamMode};
use harbor_core::extract::is_truthy;
use harbor_core::spec::decode_descriptor;
use harbor_core::{
    AssertionResult, Direction, EventRecord, ExpectedEvent, Phase, Result, SimulatedEventType,
};

const EXPECTED_PREVIEW_CHARS: usize = 50;

/// Builds the event trace in memory without network I/O.
///
/// Every check recorded here passes; expected events are echoed back as
/// simulated receipts without comparing their content.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedMode;

#[async_trait]
impl EventStreamMode for SimulatedMode {
    fn label(&self) -> &'static str {
        "simulated"
    }

    async fn exercise(&self, run: &mut EventRun<'_>) -> Result<()> {
        run.status.phase(Phase::Simulating, "Running simulated event test...");
        let topic = run.outbound_topic();
        let topic_label = topic.clone().unwrap_or_default();
        tracing::info!("Simulated {:?} to topic: {topic_label}", run.spec.event_type);

        let outbound = || {
            EventRecord::new(Direction::Outbound, topic.clone(), run.message.clone())
                .with_partition_key(run.spec.partition_key.clone())
                .simulated()
        };
        let (event, assertion) = match run.spec.event_type {
            SimulatedEventType::Publish => (
                outbound(),
                AssertionResult::new(
                    "Event Published (Simulated)",
                    "publish",
                    true,
                    "Event published",
                    format!("Simulated publish to {topic_label}"),
                ),
            ),
            SimulatedEventType::Subscribe => (
                EventRecord::new(Direction::Inbound, topic.clone(), run.message.clone()).simulated(),
                AssertionResult::new(
                    "Subscription Active (Simulated)",
                    "subscribe",
                    true,
                    "Subscribed to topic",
                    format!("Simulated subscription to {topic_label}"),
                ),
            ),
            SimulatedEventType::Roundtrip => (
                outbound(),
                AssertionResult::new(
                    "Trigger Event Published (Simulated)",
                    "publish",
                    true,
                    "Event published",
                    format!("Simulated publish to {topic_label}"),
                ),
            ),
        };
        run.record(event);
        run.assert(assertion);

        let expected: Vec<ExpectedEvent> =
            decode_descriptor(run.spec.expected_events.as_ref())?.unwrap_or_default();
        for expectation in expected {
            let (receipt, check) = simulated_receipt(expectation);
            run.record(receipt);
            run.assert(check);
        }

        run.assert(AssertionResult::info(
            "Mode",
            "Real API call",
            "Simulated (provide API URL and Token for real testing)",
        ));
        Ok(())
    }
}

/// Echoes an expected event back as a received one.
fn simulated_receipt(expectation: ExpectedEvent) -> (EventRecord, AssertionResult) {
    let content = expectation
        .contains
        .filter(is_truthy)
        .or_else(|| expectation.payload.filter(is_truthy))
        .unwrap_or_else(|| json!({}));
    let name = format!(
        "Event on {} (Simulated)",
        expectation.topic.as_deref().unwrap_or("unspecified topic")
    );
    let preview = format!("{}...", truncate(&content.to_string(), EXPECTED_PREVIEW_CHARS));

    let event = EventRecord::new(Direction::Inbound, expectation.topic, content).simulated();
    let assertion = AssertionResult::new(name, "receive", true, preview, "Simulated event received");
    (event, assertion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_receipt_prefers_contains_over_payload() {
        let (event, assertion) = simulated_receipt(ExpectedEvent {
            topic: Some("orders.done".to_owned()),
            contains: Some(json!({"status": "done"})),
            payload: Some(json!({"ignored": true})),
        });
        assert_eq!(event.payload, json!({"status": "done"}));
        assert!(event.simulated);
        assert_eq!(assertion.name, "Event on orders.done (Simulated)");
        assert_eq!(assertion.expected, Value::String("{\"status\":\"done\"}...".to_owned()));
        assert!(assertion.passed);
    }

    #[test]
    fn test_receipt_defaults_to_empty_object() {
        let (event, assertion) = simulated_receipt(ExpectedEvent::default());
        assert_eq!(event.payload, json!({}));
        assert_eq!(assertion.expected, json!("{}..."));
    }
}
