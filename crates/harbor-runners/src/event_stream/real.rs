use async_trait::async_trait;
use core::time::Duration;
use serde_json::{Value, from_str};
use std::sync::Arc;
use tokio::time::{Instant, sleep};

use super::payload::{encode, request_details, truncate};
use super::{EventRun, EventStreamMode};
use harbor_client::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, auth, send_with_timeout};
use harbor_core::extract::{is_truthy, locate_messages};
use harbor_core::spec::decode_message_properties;
use harbor_core::{
    AssertionResult, ConsumerCapture, Direction, EventRecord, HttpCapture, Phase, Result,
};

const CONSUMER_BODY_CHARS: usize = 1_000;
const CONSUMER_EVENT_CHARS: usize = 500;

/// Publishes to a real event stream endpoint with bearer auth.
pub struct RealMode {
    transport: Arc<dyn HttpTransport>,
    url: String,
    token: String,
}

impl RealMode {
    /// Creates a mode publishing to `url` with `token`.
    pub fn new(transport: Arc<dyn HttpTransport>, url: &str, token: &str) -> Self {
        Self {
            transport,
            url: url.trim().to_owned(),
            token: token.to_owned(),
        }
    }

    fn publish_request(&self, run: &EventRun<'_>) -> HttpRequest {
        let properties = decode_message_properties(run.spec.message_properties.as_ref());
        let encoded = encode(
            &run.message,
            run.spec.message_format,
            &properties,
            run.spec.partition_key.as_deref(),
        );
        let request = HttpRequest::new(HttpMethod::Post, self.url.clone())
            .with_header("Authorization", auth::bearer(&self.token));
        encoded.apply(request)
    }

    async fn verify(&self, run: &mut EventRun<'_>, consumer_endpoint: &str) {
        let delay = run.spec.verify_delay;
        run.status.phase(
            Phase::Waiting,
            format!("Waiting {delay}ms before verification..."),
        );
        sleep(Duration::from_millis(delay)).await;
        run.status.phase(Phase::Verifying, "Calling consumer endpoint...");

        let mut request =
            HttpRequest::get(consumer_endpoint).with_header("Content-Type", "application/json");
        if let Some(credential) = run.spec.consumer_api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.with_header("Authorization", auth::consumer_authorization(credential));
        }

        match send_with_timeout(self.transport.as_ref(), request, run.spec.timeout).await {
            Ok(response) => record_consumer(run, &response),
            Err(error) => {
                tracing::warn!("Consumer endpoint failed: {error}");
                run.assert(AssertionResult::new(
                    "Consumer Endpoint",
                    "consume",
                    false,
                    "Successful response",
                    format!("Error: {error}"),
                ));
            }
        }
    }
}

#[async_trait]
impl EventStreamMode for RealMode {
    fn label(&self) -> &'static str {
        "real"
    }

    async fn exercise(&self, run: &mut EventRun<'_>) -> Result<()> {
        run.status.phase(Phase::Publishing, "Publishing to event stream...");
        let request = self.publish_request(run);
        run.trace.request_details = Some(request_details(&request, run.spec.message_format));
        tracing::info!(
            url = %self.url,
            format = run.spec.message_format.as_str(),
            "Publishing event"
        );
        tracing::debug!("Request body: {}", request.body.as_deref().unwrap_or_default());

        let sent = Instant::now();
        let response = send_with_timeout(self.transport.as_ref(), request, run.spec.timeout).await?;
        let response_time = sent.elapsed().as_millis() as u64;
        record_publish(run, &response, response_time);

        if !response.is_success() {
            let detail = if response.body.is_empty() {
                response.status_text.as_str()
            } else {
                response.body.as_str()
            };
            run.assert(AssertionResult::new(
                "Publish Success",
                "publish",
                false,
                "Message published",
                format!("Error: {detail}"),
            ));
            return Ok(());
        }

        run.assert(AssertionResult::new(
            "Message Published",
            "publish",
            true,
            "Message published to Event Stream",
            "Success",
        ));

        let consumer = run
            .spec
            .consumer_endpoint
            .clone()
            .filter(|endpoint| !endpoint.trim().is_empty());
        if let Some(consumer) = consumer.filter(|_| run.spec.test_type.verifies()) {
            self.verify(run, &consumer).await;
        }
        Ok(())
    }
}

/// Records the publish response and the checks made on it.
fn record_publish(run: &mut EventRun<'_>, response: &HttpResponse, response_time: u64) {
    let success = response.is_success();
    let mut capture = HttpCapture {
        status: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.clone(),
        body: Value::String(response.body.clone()),
        response_time,
        parsed: None,
    };

    let event = EventRecord::new(Direction::Outbound, run.outbound_topic(), run.message.clone())
        .with_status(response.status);
    run.record(event);

    run.assert(AssertionResult::new(
        "HTTP Status",
        "status",
        success,
        "2xx Success",
        format!("{} {}", response.status, response.status_text),
    ));

    if let Some(max) = run.spec.options.max_response_time {
        run.assert(AssertionResult::new(
            "Response Time",
            "timing",
            response_time <= max,
            format!("<= {max}ms"),
            format!("{response_time}ms"),
        ));
    }

    if success
        && !response.body.is_empty()
        && let Ok(parsed) = from_str::<Value>(&response.body)
    {
        let message_id = ["messageId", "id"]
            .into_iter()
            .find_map(|key| parsed.get(key).filter(|value| is_truthy(value)).cloned());
        if let Some(message_id) = message_id {
            run.assert(AssertionResult::new(
                "Message ID Returned",
                "response",
                true,
                "Message ID",
                message_id,
            ));
        }
        capture.parsed = Some(parsed);
    }

    run.trace.response = Some(capture);
}

/// Records the consumer response and the checks made on it.
fn record_consumer(run: &mut EventRun<'_>, response: &HttpResponse) {
    let success = response.is_success();
    let mut capture = ConsumerCapture {
        status: response.status,
        status_text: response.status_text.clone(),
        body: truncate(&response.body, CONSUMER_BODY_CHARS),
        parsed: None,
    };

    let topic = Some(run.spec.topic.clone().unwrap_or_else(|| "consumer".to_owned()));
    let event = EventRecord::new(
        Direction::Inbound,
        topic,
        Value::String(truncate(&response.body, CONSUMER_EVENT_CHARS)),
    )
    .with_status(response.status);
    run.record(event);

    run.assert(AssertionResult::new(
        "Consumer Endpoint Reached",
        "consume",
        success,
        "2xx Success",
        format!("{} {}", response.status, response.status_text),
    ));

    let expected = run
        .spec
        .expected_in_message
        .clone()
        .filter(|text| !text.is_empty());
    if let Some(expected) = expected.filter(|_| success) {
        let found = response
            .body
            .to_lowercase()
            .contains(&expected.to_lowercase());
        run.assert(AssertionResult::new(
            "Expected Content Found",
            "content",
            found,
            format!("Contains: \"{expected}\""),
            if found { "Found" } else { "Not found in response" },
        ));
    }

    if success
        && !response.body.is_empty()
        && let Ok(parsed) = from_str::<Value>(&response.body)
    {
        let count = locate_messages(&parsed).len();
        run.assert(AssertionResult::new(
            "Messages Retrieved",
            "consume",
            count > 0,
            "At least 1 message",
            format!("{count} message(s)"),
        ));
        capture.parsed = Some(parsed);
    }

    run.trace.consumer_response = Some(capture);
}
