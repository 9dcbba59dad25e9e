//! Test runners for the harbor integration test engine.
//!
//! Each runner takes one kind of specification through its phases and
//! returns a [`TestResult`](harbor_core::TestResult). Progress is published
//! to the [`StatusRegistry`](harbor_core::StatusRegistry) in the run's
//! [`RunEnvironment`] and removed once the run ends.
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

/// Agent prompt/response checks.
pub mod agent;
/// Shared collaborators.
pub mod environment;
/// Event stream publish and verification.
pub mod event_stream;
/// Execute-then-poll driver.
pub mod execution;
/// Runner trait and dispatch.
pub mod runner;
/// Platform process runs.
pub mod scheduled_job;
/// Single HTTP request checks.
pub mod web_service;

pub use agent::{AgentInvoker, AgentRunner, ApiInvoker, ProcessInvoker};
pub use environment::{DEFAULT_POLL_INTERVAL_MS, RunEnvironment};
pub use event_stream::{EventStreamMode, EventStreamRunner, RealMode, SimulatedMode};
pub use execution::{ExecutionDriver, PollOutcome, max_polls};
pub use runner::{TestEngine, TestRunner};
pub use scheduled_job::ScheduledJobRunner;
pub use web_service::WebServiceRunner;
