use async_trait::async_trait;

use crate::agent::AgentRunner;
use crate::environment::RunEnvironment;
use crate::event_stream::EventStreamRunner;
use crate::scheduled_job::ScheduledJobRunner;
use crate::web_service::WebServiceRunner;
use harbor_core::{RunId, TestResult, TestSpecification};

/// Drives one kind of test from specification to result.
///
/// Runners never fail: every error ends up in the returned result's `error`
/// field with status `failed`, and the run's status record is gone by the
/// time the result is returned.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Specification this runner accepts.
    type Spec: Sync;

    /// Prefix used when generating run ids.
    fn run_prefix(&self) -> &'static str;

    /// Runs under a caller-chosen id, so progress can be observed while it runs.
    async fn run_with_id(&self, spec: &Self::Spec, run_id: RunId) -> TestResult;

    /// Runs under a freshly generated id.
    async fn run(&self, spec: &Self::Spec) -> TestResult {
        self.run_with_id(spec, RunId::generate(self.run_prefix())).await
    }
}

/// Dispatches a [`TestSpecification`] to the matching runner.
pub struct TestEngine {
    web_service: WebServiceRunner,
    scheduled_job: ScheduledJobRunner,
    event_stream: EventStreamRunner,
    agent: AgentRunner,
}

impl TestEngine {
    /// Creates every runner over one environment.
    pub fn new(env: &RunEnvironment) -> Self {
        Self {
            web_service: WebServiceRunner::new(env.clone()),
            scheduled_job: ScheduledJobRunner::new(env.clone()),
            event_stream: EventStreamRunner::new(env.clone()),
            agent: AgentRunner::new(env.clone()),
        }
    }

    /// Generates a run id with the prefix of the runner `spec` goes to.
    pub fn run_id_for(&self, spec: &TestSpecification) -> RunId {
        let prefix = match spec {
            TestSpecification::WebService(_) => self.web_service.run_prefix(),
            TestSpecification::ScheduledJob(_) => self.scheduled_job.run_prefix(),
            TestSpecification::EventStream(_) => self.event_stream.run_prefix(),
            TestSpecification::Agent(_) => self.agent.run_prefix(),
        };
        RunId::generate(prefix)
    }

    /// Runs a specification under a fresh id.
    pub async fn run(&self, spec: &TestSpecification) -> TestResult {
        self.run_with_id(spec, self.run_id_for(spec)).await
    }

    /// Runs a specification under the given id.
    pub async fn run_with_id(&self, spec: &TestSpecification, run_id: RunId) -> TestResult {
        match spec {
            TestSpecification::WebService(spec) => self.web_service.run_with_id(spec, run_id).await,
            TestSpecification::ScheduledJob(spec) => {
                self.scheduled_job.run_with_id(spec, run_id).await
            }
            TestSpecification::EventStream(spec) => {
                self.event_stream.run_with_id(spec, run_id).await
            }
            TestSpecification::Agent(spec) => self.agent.run_with_id(spec, run_id).await,
        }
    }

    /// The scheduled job runner, for callers composing job runs.
    pub fn scheduled_job(&self) -> &ScheduledJobRunner {
        &self.scheduled_job
    }
}
