use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use harbor_client::ListenerStatus;
use harbor_core::{ScheduledJobSpec, TestResult};

/// Environment a package is deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEnvironment {
    /// Platform environment id.
    pub environment_id: String,
    /// Listener state after deployment, `RUNNING` when absent.
    #[serde(default)]
    pub listener_status: Option<ListenerStatus>,
}

/// Input for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    /// Component to package. Takes precedence over `component_name`.
    #[serde(default)]
    pub component_id: Option<String>,
    /// Process name looked up when no id is given.
    #[serde(default)]
    pub component_name: Option<String>,
    /// Package version, `v{epoch_ms}` when absent.
    #[serde(default)]
    pub package_version: Option<String>,
    /// Notes stored with the package.
    #[serde(default)]
    pub package_notes: Option<String>,
    /// Deployment targets, deployed in order.
    #[serde(default)]
    pub target_environments: Vec<TargetEnvironment>,
    /// Run `test_config` after deploying.
    #[serde(default)]
    pub run_tests_after_deploy: bool,
    /// Smoke test run after deploying.
    #[serde(default)]
    pub test_config: Option<ScheduledJobSpec>,
}

/// Overall pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Still in progress.
    Running,
    /// Packaged and every later step succeeded.
    Success,
    /// Packaged, but a deployment or the smoke test failed.
    Partial,
    /// Aborted before anything was deployed.
    Failed,
}

/// Pipeline step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Component lookup by name.
    Lookup,
    /// Package creation.
    Package,
    /// Deployment to one environment.
    Deploy,
    /// Post-deploy smoke test.
    Test,
}

/// One entry of the step log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Step kind.
    pub step: StepKind,
    /// `success`, `failed`, or the smoke test's status.
    pub status: String,
    /// Ids produced by the step or the failure message.
    pub detail: Value,
}

impl StepRecord {
    /// A successful step.
    pub fn success(step: StepKind, detail: Value) -> Self {
        Self {
            step,
            status: "success".to_owned(),
            detail,
        }
    }

    /// A failed step.
    pub fn failed(step: StepKind, detail: Value) -> Self {
        Self {
            step,
            status: "failed".to_owned(),
            detail,
        }
    }
}

/// Result of deploying to one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    /// Target environment.
    pub environment_id: String,
    /// `success` or `failed`.
    pub status: String,
    /// Deployment returned by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Value>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of a pipeline run. Steps are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    /// `pipeline-{epoch_ms}-{uuid}`.
    pub pipeline_id: String,
    /// When the run began.
    pub start_time: DateTime<Utc>,
    /// When the run ended.
    pub end_time: Option<DateTime<Utc>>,
    /// Overall state.
    pub status: PipelineStatus,
    /// Step log in execution order.
    pub steps: Vec<StepRecord>,
    /// Package created by the run.
    pub package: Option<Value>,
    /// Per-environment deployment outcomes.
    pub deployments: Vec<DeploymentOutcome>,
    /// Smoke test results.
    pub tests: Vec<TestResult>,
    /// Failure messages.
    pub errors: Vec<String>,
}

impl PipelineRun {
    /// Starts a run record stamped now.
    pub fn start(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: PipelineStatus::Running,
            steps: Vec::new(),
            package: None,
            deployments: Vec::new(),
            tests: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Number of successful deployments.
    pub fn deployed_count(&self) -> usize {
        self.deployments
            .iter()
            .filter(|deployment| deployment.error.is_none())
            .count()
    }
}
