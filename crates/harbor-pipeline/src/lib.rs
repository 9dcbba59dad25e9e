//! Package-and-deploy pipelines and CI script generation.
//!
//! [`PipelineOrchestrator`] resolves a component, packages it, deploys the
//! package to each target environment and optionally runs a scheduled job
//! smoke test, recording every step in a [`PipelineRun`].
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Test allows"
    )
)]

/// Pipeline driver.
pub mod orchestrator;
/// CI/CD script templates.
pub mod scripts;
/// Pipeline request and run records.
pub mod types;

pub use orchestrator::PipelineOrchestrator;
pub use scripts::{CiScripts, CiTool, CurlCommands, ScriptRequest, generate_scripts};
pub use types::{
    DeploymentOutcome, PipelineRequest, PipelineRun, PipelineStatus, StepKind, StepRecord,
    TargetEnvironment,
};
