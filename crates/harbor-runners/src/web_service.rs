//! Single authenticated HTTP request checked against declarative assertions.

use async_trait::async_trait;
use serde_json::{Value, from_str};
use std::time::Instant;
use tokio::time::Instant as TokioInstant;

use crate::environment::RunEnvironment;
use crate::runner::TestRunner;
use harbor_client::{
    HttpMethod, HttpRequest, HttpResponse, auth, send_with_timeout, set_header,
};
use harbor_core::extract::is_truthy;
use harbor_core::spec::{decode_embedded, render};
use harbor_core::{
    AssertionResult, CapturedResponse, Error, HttpCapture, Phase, Result, RunId, RunStatus,
    TestKind, TestPayload, TestResult, WebServicePayload, WebServiceSpec, evaluate,
};

/// Name used when the test has none.
const DEFAULT_NAME: &str = "Web Service Test";
/// Error reported when the request timer fires.
const TIMEOUT_MESSAGE: &str = "Request timed out";

/// Runs [`WebServiceSpec`]s.
pub struct WebServiceRunner {
    env: RunEnvironment,
}

impl WebServiceRunner {
    /// Creates a runner over the given environment.
    pub fn new(env: RunEnvironment) -> Self {
        Self { env }
    }

    async fn execute(
        &self,
        spec: &WebServiceSpec,
        status: &RunStatus,
        payload: &mut WebServicePayload,
    ) -> Result<Vec<AssertionResult>> {
        let request = build_request(spec)?;
        status.phase(Phase::Executing, format!("{} {}", request.method, request.url));
        tracing::info!("{} {}", request.method, request.url);

        let sent = TokioInstant::now();
        let response = send_with_timeout(self.env.transport.as_ref(), request, spec.timeout).await?;
        let response_time = sent.elapsed().as_millis() as u64;

        status.phase(Phase::Validating, "Evaluating assertions...");
        let capture = capture(response, response_time);
        let mut assertions = Vec::with_capacity(spec.assertions.len() + 1);

        if let Some(expected) = spec.expected_status.as_ref().filter(|value| !value.is_null()) {
            let passed = expected_code(expected) == Some(i64::from(capture.status));
            assertions.push(AssertionResult::new(
                "Status Code",
                "status",
                passed,
                expected.clone(),
                capture.status,
            ));
        }

        let captured = CapturedResponse {
            body: &capture.body,
            headers: &capture.headers,
            response_time: capture.response_time,
        };
        assertions.extend(
            spec.assertions
                .iter()
                .map(|assertion| evaluate(assertion, &captured)),
        );

        payload.response = Some(capture);
        Ok(assertions)
    }
}

#[async_trait]
impl TestRunner for WebServiceRunner {
    type Spec = WebServiceSpec;

    fn run_prefix(&self) -> &'static str {
        "webservice-test"
    }

    async fn run_with_id(&self, spec: &WebServiceSpec, run_id: RunId) -> TestResult {
        let started = Instant::now();
        let status = self.env.registry.start(run_id.clone(), "Initializing web service test...");
        let mut result = TestResult::new(
            spec.name.as_deref().unwrap_or(DEFAULT_NAME),
            TestKind::WebService,
            run_id,
            TestPayload::WebService(WebServicePayload::default()),
        );
        let mut payload = WebServicePayload::default();

        match self.execute(spec, &status, &mut payload).await {
            Ok(assertions) => {
                result.assertions = assertions;
                result.conclude(started);
            }
            Err(error) if error.is_timeout() => result.fail(TIMEOUT_MESSAGE, started),
            Err(error) => {
                tracing::error!("Web service test failed: {error}");
                result.fail(error, started);
            }
        }

        result.payload = TestPayload::WebService(payload);
        result
    }
}

/// Builds the outgoing request: JSON content type, caller headers, auth, body.
fn build_request(spec: &WebServiceSpec) -> Result<HttpRequest> {
    let method: HttpMethod = spec.method.parse()?;
    let mut request =
        HttpRequest::new(method, spec.endpoint.clone()).with_header("Content-Type", "application/json");

    if let Some(headers) = spec.headers.as_ref() {
        match decode_embedded(headers)? {
            Value::Object(map) => {
                for (name, value) in map {
                    set_header(&mut request.headers, name, render(&value));
                }
            }
            Value::Null => {}
            _ => return Err(Error::Config("Headers must be a JSON object".to_owned())),
        }
    }

    if let Some(auth_spec) = spec.auth.as_ref() {
        auth::apply(&mut request.headers, auth_spec);
    }

    let body = spec.body.as_ref().filter(|body| is_truthy(body));
    if let Some(body) = body.filter(|_| method.allows_body()) {
        request.body = Some(render(body));
    }

    Ok(request)
}

/// Records a response, decoding JSON bodies when the content type says so.
fn capture(response: HttpResponse, response_time: u64) -> HttpCapture {
    let body = if response.is_json() {
        from_str(&response.body).unwrap_or_else(|_| Value::String(response.body.clone()))
    } else {
        Value::String(response.body.clone())
    };
    HttpCapture {
        status: response.status,
        status_text: response.status_text,
        headers: response.headers,
        body,
        response_time,
        parsed: None,
    }
}

/// Reads an expected status given as a number or a numeric string.
fn expected_code(expected: &Value) -> Option<i64> {
    match expected {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
