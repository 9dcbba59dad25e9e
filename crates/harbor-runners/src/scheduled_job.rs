//! Process execution on the platform, polled until it finishes.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;

use crate::environment::RunEnvironment;
use crate::execution::{ExecutionDriver, PollOutcome};
use crate::runner::TestRunner;
use harbor_client::{ExecutionRecord, ExecutionRequest};
use harbor_core::spec::{decode_descriptor, decode_properties, render};
use harbor_core::{
    AssertionResult, Error, ExpectedOutput, JobOutput, Phase, Result, RunId, RunStatus,
    ScheduledJobPayload, ScheduledJobSpec, StatusRecord, TestKind, TestPayload, TestResult,
    evaluate_numeric,
};

const DEFAULT_NAME: &str = "Scheduled Job Test";
const COMPLETE: &str = "COMPLETE";

/// Runs [`ScheduledJobSpec`]s.
pub struct ScheduledJobRunner {
    env: RunEnvironment,
}

impl ScheduledJobRunner {
    /// Creates a runner over the given environment.
    pub fn new(env: RunEnvironment) -> Self {
        Self { env }
    }

    async fn execute(
        &self,
        spec: &ScheduledJobSpec,
        status: &RunStatus,
        payload: &mut ScheduledJobPayload,
    ) -> Result<Vec<AssertionResult>> {
        self.env.require_platform()?;
        let properties = decode_properties(spec.input_data.as_ref())?;
        let request = ExecutionRequest::resolve(
            &spec.process_id,
            spec.atom_id.as_deref(),
            self.env.platform.default_atom_id(),
            properties,
        )?;

        let platform = self.env.platform.as_ref();
        let driver = ExecutionDriver::new(platform, status, self.env.poll_interval_ms);
        let handle = driver.start(&request).await?;
        payload.execution_id = Some(handle.execution_id.clone());
        status.update(
            StatusRecord::new(Phase::Polling, "Process started, waiting for completion...")
                .with_execution_id(&handle.execution_id),
        );

        let record = match driver.wait(&handle, spec.timeout).await {
            PollOutcome::Finished(record) => record,
            PollOutcome::TimedOut(last) => {
                let last_status = last
                    .as_ref()
                    .and_then(|record| record.status.as_deref())
                    .unwrap_or("unknown");
                return Err(Error::Other(format!(
                    "Execution timed out after {}ms. Last status: {last_status}",
                    spec.timeout
                )));
            }
        };

        if spec.options.capture_execution_logs {
            payload.logs = self.fetch_logs(&record, status).await;
        }

        status.phase(Phase::Validating, "Validating results...");
        let output = record.to_output();
        let expected: ExpectedOutput =
            decode_descriptor(spec.expected_output.as_ref())?.unwrap_or_default();
        let assertions = validate(&output, &expected);
        payload.output = Some(output);
        Ok(assertions)
    }

    async fn fetch_logs(&self, record: &ExecutionRecord, status: &RunStatus) -> Option<String> {
        let execution_id = record.execution_id.as_deref()?;
        status.phase(Phase::Logs, "Fetching execution logs...");
        self.env.platform.execution_logs(execution_id).await
    }
}

#[async_trait]
impl TestRunner for ScheduledJobRunner {
    type Spec = ScheduledJobSpec;

    fn run_prefix(&self) -> &'static str {
        "job-test"
    }

    async fn run_with_id(&self, spec: &ScheduledJobSpec, run_id: RunId) -> TestResult {
        let started = Instant::now();
        let status = self.env.registry.start(run_id.clone(), "Initializing scheduled job test...");
        let mut result = TestResult::new(
            spec.name.as_deref().unwrap_or(DEFAULT_NAME),
            TestKind::ScheduledJob,
            run_id,
            TestPayload::ScheduledJob(ScheduledJobPayload::default()),
        );
        let mut payload = ScheduledJobPayload::default();

        match self.execute(spec, &status, &mut payload).await {
            Ok(assertions) => {
                result.assertions = assertions;
                result.conclude(started);
            }
            Err(error) => {
                tracing::error!("Scheduled job test failed: {error}");
                result.fail(error, started);
            }
        }

        result.payload = TestPayload::ScheduledJob(payload);
        result
    }
}

/// Checks a finished execution against the expected output.
///
/// The status check is always present; the others only when requested.
pub fn validate(output: &JobOutput, expected: &ExpectedOutput) -> Vec<AssertionResult> {
    let mut assertions = vec![AssertionResult::new(
        "Process Status",
        "status",
        output.status == COMPLETE,
        COMPLETE,
        output.status.clone(),
    )];

    if let Some(directive) = expected.records_processed.as_ref().filter(|value| !value.is_null()) {
        let directive_text = render(directive);
        assertions.push(AssertionResult::new(
            "Records Processed",
            "recordCount",
            evaluate_numeric(output.outbound_document_count, &directive_text),
            directive.clone(),
            output.outbound_document_count,
        ));
    }

    if let Some(error_count) = expected.error_count {
        assertions.push(AssertionResult::new(
            "Error Count",
            "errorCount",
            output.error_document_count == error_count,
            error_count,
            output.error_document_count,
        ));
    }

    if let Some(max_duration) = expected.max_duration {
        let duration = output.execution_duration;
        assertions.push(AssertionResult::new(
            "Max Duration",
            "duration",
            duration.is_some_and(|duration| duration <= max_duration),
            format!("<= {max_duration}ms"),
            duration.map_or(Value::Null, |duration| Value::String(format!("{duration}ms"))),
        ));
    }

    assertions
}
