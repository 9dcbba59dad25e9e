//! Command handlers for CLI operations

use anyhow::{Context as _, Result};
use core::time::Duration;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::time::interval;

use crate::cli::{GetKind, ListKind, ToolArg};
use harbor_client::{Catalog, ComponentKind, Deployments};
use harbor_core::{HarborConfig, StatusRegistry, TestResult, TestSpecification, TestStatus};
use harbor_pipeline::{
    PipelineOrchestrator, PipelineRequest, PipelineStatus, ScriptRequest, generate_scripts,
};
use harbor_runners::{RunEnvironment, TestEngine};

const PROGRESS_INTERVAL_MS: u64 = 1_000;

/// Either one specification or a batch run concurrently.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SpecFile {
    /// Several specifications.
    Many(Vec<TestSpecification>),
    /// A single specification.
    One(Box<TestSpecification>),
}

impl SpecFile {
    fn into_specs(self) -> Vec<TestSpecification> {
        match self {
            Self::Many(specs) => specs,
            Self::One(spec) => vec![*spec],
        }
    }
}

/// Load configuration from `path` or the default location, then apply `BOOMI_*` overrides
///
/// # Errors
/// Returns an error if the config file cannot be read or parsed
pub fn load_config(path: Option<&Path>, poll_interval: Option<u64>) -> Result<HarborConfig> {
    let mut config = match path {
        Some(path) => HarborConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HarborConfig::load_or_create().unwrap_or_else(|error| {
            tracing::warn!("Failed to load config from ~/.harbor/config.toml: {error}");
            tracing::warn!("Using default configuration");
            HarborConfig::default()
        }),
    }
    .with_env_overrides();

    if let Some(poll_interval) = poll_interval {
        config.runner.poll_interval_ms = poll_interval;
    }
    Ok(config)
}

async fn read_json<T: DeserializeOwned>(file: &Path) -> Result<T> {
    let text = async_fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", file.display()))
}

#[allow(clippy::print_stdout, reason = "Results are written to stdout")]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run every specification in `file` concurrently and print the results
///
/// Returns whether every test passed.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub async fn handle_run(config: &HarborConfig, file: &Path, progress: bool) -> Result<bool> {
    let specs = read_json::<SpecFile>(file).await?.into_specs();
    tracing::info!("Running {} test(s) from {}", specs.len(), file.display());

    let registry = StatusRegistry::new();
    let engine = TestEngine::new(&RunEnvironment::from_config(config, registry.clone()));
    let reporter = progress.then(|| tokio::spawn(report_progress(registry)));

    let results: Vec<TestResult> = join_all(specs.iter().map(|spec| engine.run(spec))).await;

    if let Some(reporter) = reporter {
        reporter.abort();
    }

    let passed = results
        .iter()
        .filter(|result| result.status == TestStatus::Passed)
        .count();
    tracing::info!("{passed}/{} test(s) passed", results.len());

    if let [result] = results.as_slice() {
        print_json(result)?;
    } else {
        print_json(&results)?;
    }
    Ok(passed == results.len())
}

/// Logs every live status record until aborted.
async fn report_progress(registry: StatusRegistry) {
    let mut ticker = interval(Duration::from_millis(PROGRESS_INTERVAL_MS));
    loop {
        ticker.tick().await;
        for (run_id, record) in registry.active() {
            match (record.poll, record.max_polls) {
                (Some(poll), Some(max_polls)) => tracing::info!(
                    "[{run_id}] {:?}: {} ({poll}/{max_polls})",
                    record.phase,
                    record.message
                ),
                _ => tracing::info!("[{run_id}] {:?}: {}", record.phase, record.message),
            }
        }
    }
}

/// Run a pipeline request and print the run record
///
/// Returns whether the pipeline did not fail outright.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub async fn handle_pipeline(config: &HarborConfig, file: &Path) -> Result<bool> {
    let request: PipelineRequest = read_json(file).await?;
    let env = RunEnvironment::from_config(config, StatusRegistry::new());
    env.require_platform()?;

    let run = PipelineOrchestrator::new(&env).run(&request).await;
    print_json(&run)?;
    Ok(run.status != PipelineStatus::Failed)
}

/// Print the configuration summary without contacting the platform
///
/// # Errors
/// Returns an error if the summary cannot be serialized
pub fn handle_health(config: &HarborConfig) -> Result<()> {
    print_json(&serde_json::json!({
        "status": "ok",
        "config": config.summary(),
    }))
}

fn platform_env(config: &HarborConfig) -> Result<RunEnvironment> {
    let env = RunEnvironment::from_config(config, StatusRegistry::new());
    env.require_platform()?;
    Ok(env)
}

/// List runtimes and processes to prove the credentials work
///
/// # Errors
/// Returns an error if credentials are missing or either listing fails
pub async fn handle_check_connection(config: &HarborConfig) -> Result<()> {
    let env = platform_env(config)?;
    let report = Catalog::new(Arc::clone(&env.platform))
        .check_connection()
        .await
        .context("Connection check failed")?;
    print_json(&report)
}

/// Options narrowing a listing.
pub struct ListFilter {
    /// Environment for deployments.
    pub environment: Option<String>,
    /// Component for packages and history.
    pub component: Option<String>,
    /// Process for executions.
    pub process: Option<String>,
    /// Maximum execution records.
    pub limit: usize,
}

/// Print a listing of platform objects
///
/// # Errors
/// Returns an error if credentials are missing or the query fails
pub async fn handle_list(config: &HarborConfig, kind: ListKind, filter: &ListFilter) -> Result<()> {
    let env = platform_env(config)?;
    let catalog = Catalog::new(Arc::clone(&env.platform));
    let deployments = Deployments::new(Arc::clone(&env.platform));

    let items = match kind {
        ListKind::Processes => catalog.processes().await?,
        ListKind::Atoms => catalog.atoms().await?,
        ListKind::Environments => catalog.environments().await?,
        ListKind::Packages => deployments.packages(filter.component.as_deref()).await?,
        ListKind::Deployments => deployments.deployments(filter.environment.as_deref()).await?,
        ListKind::History => {
            let component = filter
                .component
                .as_deref()
                .context("--component is required for deployment history")?;
            deployments.history(component).await?
        }
        ListKind::Executions => {
            catalog
                .executions(filter.process.as_deref(), filter.limit)
                .await?
        }
    };
    tracing::info!("Found {} item(s)", items.len());
    print_json(&items)
}

/// Print one environment or packaged component by id
///
/// # Errors
/// Returns an error if credentials are missing or the platform call fails
pub async fn handle_get(config: &HarborConfig, kind: GetKind, id: &str) -> Result<()> {
    let env = platform_env(config)?;
    let item = match kind {
        GetKind::Environment => Catalog::new(Arc::clone(&env.platform)).environment(id).await?,
        GetKind::Package => Deployments::new(Arc::clone(&env.platform)).package(id).await?,
    };
    print_json(&item)
}

/// Print the component with the given name
///
/// # Errors
/// Returns an error if credentials are missing, the query fails or nothing matches
pub async fn handle_lookup(config: &HarborConfig, name: &str, any_component: bool) -> Result<()> {
    let env = platform_env(config)?;
    let kind = if any_component {
        ComponentKind::Component
    } else {
        ComponentKind::Process
    };
    let component = Deployments::new(Arc::clone(&env.platform))
        .component_by_name(name, kind)
        .await?
        .with_context(|| format!("Component not found: {name}"))?;
    print_json(&component)
}

/// Remove a deployment
///
/// # Errors
/// Returns an error if credentials are missing or the platform rejects the removal
pub async fn handle_undeploy(config: &HarborConfig, deployment_id: &str) -> Result<()> {
    let env = platform_env(config)?;
    let receipt = Deployments::new(Arc::clone(&env.platform))
        .undeploy(deployment_id)
        .await?;
    print_json(&receipt)
}

/// Print CI/CD snippets
///
/// # Errors
/// Returns an error if the snippets cannot be serialized
pub fn handle_scripts(
    config: &HarborConfig,
    component_id: String,
    package_version: String,
    environment_id: String,
    tool: Option<ToolArg>,
) -> Result<()> {
    let request = ScriptRequest {
        component_id,
        package_version,
        environment_id,
        tool: tool.map(Into::into),
    };
    print_json(&generate_scripts(&request, &config.platform))
}
