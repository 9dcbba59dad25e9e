use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{
    DeploymentOutcome, PipelineRequest, PipelineRun, PipelineStatus, StepKind, StepRecord,
};
use harbor_client::{ComponentKind, Deployments};
use harbor_core::{
    Error, Phase, Result, RunId, RunStatus, StatusRecord, StatusRegistry, TestStatus,
};
use harbor_runners::{RunEnvironment, ScheduledJobRunner, TestRunner};

/// Drives package, deploy and smoke test steps against the platform.
///
/// A run is `failed` when it stops before a package exists. Once packaged,
/// every target is attempted and the run ends `success` or `partial`
/// depending on whether any later step failed.
pub struct PipelineOrchestrator {
    deployments: Deployments,
    registry: StatusRegistry,
    smoke_tests: ScheduledJobRunner,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over the environment's platform and registry.
    pub fn new(env: &RunEnvironment) -> Self {
        Self {
            deployments: Deployments::new(Arc::clone(&env.platform)),
            registry: env.registry.clone(),
            smoke_tests: ScheduledJobRunner::new(env.clone()),
        }
    }

    /// Generates a `pipeline-{epoch_ms}-{uuid}` id.
    ///
    /// The uuid keeps ids distinct for pipelines started in the same millisecond.
    pub fn pipeline_id() -> String {
        format!("pipeline-{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4())
    }

    /// Runs the pipeline under a fresh id.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineRun {
        self.run_with_id(request, Self::pipeline_id()).await
    }

    /// Runs the pipeline under `pipeline_id`, publishing progress under that id.
    pub async fn run_with_id(&self, request: &PipelineRequest, pipeline_id: String) -> PipelineRun {
        let status = self
            .registry
            .start(RunId::from(pipeline_id.as_str()), "Initializing pipeline...");
        let mut run = PipelineRun::start(pipeline_id);
        tracing::info!("Starting pipeline {}", run.pipeline_id);

        match self.package(request, &status, &mut run).await {
            Ok(package_id) => {
                self.deploy_all(request, &package_id, &status, &mut run).await;
                self.smoke_test(request, &status, &mut run).await;
                run.status = if run.errors.is_empty() {
                    PipelineStatus::Success
                } else {
                    PipelineStatus::Partial
                };
            }
            Err(error) => {
                tracing::error!("Pipeline {} aborted: {error}", run.pipeline_id);
                run.status = PipelineStatus::Failed;
                run.errors.push(error.to_string());
            }
        }

        run.end_time = Some(Utc::now());
        tracing::info!(
            "Pipeline {} finished: {:?}, {} of {} deployments",
            run.pipeline_id,
            run.status,
            run.deployed_count(),
            run.deployments.len()
        );
        run
    }

    /// Resolves the component and creates the package, returning its id.
    async fn package(
        &self,
        request: &PipelineRequest,
        status: &RunStatus,
        run: &mut PipelineRun,
    ) -> Result<String> {
        let component_id = self.resolve_component(request, status, run).await?;

        status.phase(Phase::Packaging, "Creating package...");
        let version = request
            .package_version
            .clone()
            .filter(|version| !version.is_empty())
            .unwrap_or_else(|| format!("v{}", Utc::now().timestamp_millis()));
        let created = self
            .deployments
            .create_package(&component_id, &version, request.package_notes.as_deref())
            .await
            .and_then(|package| {
                let package_id = string_field(&package, &["packageId"]).ok_or_else(|| {
                    Error::Shape("package response carries no packageId".to_owned())
                })?;
                Ok((package_id, package))
            });

        match created {
            Ok((package_id, package)) => {
                run.steps.push(StepRecord::success(
                    StepKind::Package,
                    json!({"packageId": package_id, "packageVersion": version}),
                ));
                run.package = Some(package);
                Ok(package_id)
            }
            Err(error) => {
                run.steps
                    .push(StepRecord::failed(StepKind::Package, json!({"error": error.to_string()})));
                Err(error)
            }
        }
    }

    async fn resolve_component(
        &self,
        request: &PipelineRequest,
        status: &RunStatus,
        run: &mut PipelineRun,
    ) -> Result<String> {
        if let Some(component_id) = request.component_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(component_id.to_owned());
        }
        let name = request
            .component_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Config("componentId or componentName is required".to_owned()))?;

        status.phase(Phase::Lookup, format!("Looking up component: {name}"));
        let found = self
            .deployments
            .component_by_name(name, ComponentKind::Process)
            .await
            .and_then(|component| {
                component
                    .as_ref()
                    .and_then(|record| string_field(record, &["id", "componentId"]))
                    .ok_or_else(|| Error::Other(format!("Component not found: {name}")))
            });

        match found {
            Ok(component_id) => {
                run.steps.push(StepRecord::success(
                    StepKind::Lookup,
                    json!({"componentId": component_id}),
                ));
                Ok(component_id)
            }
            Err(error) => {
                run.steps.push(StepRecord::failed(
                    StepKind::Lookup,
                    json!({"componentName": name, "error": error.to_string()}),
                ));
                Err(error)
            }
        }
    }

    /// Deploys to every target; failures are recorded and do not stop the loop.
    async fn deploy_all(
        &self,
        request: &PipelineRequest,
        package_id: &str,
        status: &RunStatus,
        run: &mut PipelineRun,
    ) {
        let total = request.target_environments.len();
        let notes = format!("Pipeline {} deployment", run.pipeline_id);

        for (index, target) in request.target_environments.iter().enumerate() {
            let environment_id = target.environment_id.as_str();
            status.update(
                StatusRecord::new(
                    Phase::Deploying,
                    format!("Deploying to environment {}/{total}...", index + 1),
                )
                .with_environment(environment_id),
            );

            let deployed = self
                .deployments
                .deploy_package(
                    environment_id,
                    package_id,
                    Some(notes.as_str()),
                    target.listener_status.unwrap_or_default(),
                )
                .await;

            match deployed {
                Ok(deployment) => {
                    run.steps.push(StepRecord::success(
                        StepKind::Deploy,
                        json!({
                            "environmentId": environment_id,
                            "deploymentId": string_field(&deployment, &["deploymentId", "id"]),
                        }),
                    ));
                    run.deployments.push(DeploymentOutcome {
                        environment_id: environment_id.to_owned(),
                        status: "success".to_owned(),
                        deployment: Some(deployment),
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::warn!("Deploy to {environment_id} failed: {error}");
                    run.steps.push(StepRecord::failed(
                        StepKind::Deploy,
                        json!({"environmentId": environment_id, "error": error.to_string()}),
                    ));
                    run.deployments.push(DeploymentOutcome {
                        environment_id: environment_id.to_owned(),
                        status: "failed".to_owned(),
                        deployment: None,
                        error: Some(error.to_string()),
                    });
                    run.errors
                        .push(format!("Deploy to {environment_id} failed: {error}"));
                }
            }
        }
    }

    async fn smoke_test(&self, request: &PipelineRequest, status: &RunStatus, run: &mut PipelineRun) {
        let Some(spec) = request.test_config.as_ref().filter(|_| request.run_tests_after_deploy)
        else {
            return;
        };

        status.phase(Phase::Testing, "Running post-deployment tests...");
        let result = self.smoke_tests.run(spec).await;
        if result.status != TestStatus::Passed {
            let reason = result.error.as_deref().unwrap_or("assertions failed");
            run.errors.push(format!("Post-deploy test failed: {reason}"));
        }
        run.steps.push(StepRecord {
            step: StepKind::Test,
            status: result.status.as_str().to_owned(),
            detail: json!({"testId": result.test_id, "error": result.error}),
        });
        run.tests.push(result);
    }
}

/// First non-empty string among `keys`.
fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
        .map(str::to_owned)
}
