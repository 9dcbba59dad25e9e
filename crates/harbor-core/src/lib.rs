//! Core types and pure logic for the harbor integration test engine.
//!
//! This crate provides the data model shared by every runner, the assertion
//! evaluator, the run status registry, configuration loading and the error
//! taxonomy. Nothing in here performs network I/O.
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

/// Declarative assertions and their evaluation.
pub mod assertion;
/// Configuration file and environment handling.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Ordered extraction strategies for loosely shaped JSON.
pub mod extract;
/// Test specifications accepted by the runners.
pub mod spec;
/// Live progress records keyed by run id.
pub mod status;
/// Synchronization helpers.
pub mod sync;
/// Results produced by runners.
pub mod types;

pub use assertion::{
    Actual, Assertion, CapturedResponse, LocatorKind, Operator, evaluate, evaluate_numeric,
    json_path,
};
pub use config::{ConfigSummary, HarborConfig, PlatformConfig, RunnerConfig};
pub use error::{Error, Result};
pub use spec::{
    AgentAuthType, AgentMode, AgentSpec, AuthSpec, DEFAULT_JOB_TIMEOUT_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_VERIFY_DELAY_MS, EventStreamSpec, EventTestType,
    ExpectedBehavior, ExpectedEvent, ExpectedOutput, MessageFormat, ScheduledJobSpec,
    SimulatedEventType, TestSpecification, WebServiceSpec,
};
pub use status::{Phase, RunStatus, StatusRecord, StatusRegistry};
pub use sync::IgnoreLock;
pub use types::{
    AgentPayload, AgentReply, AssertionResult, ConsumerCapture, Direction, EventRecord,
    EventStreamPayload, HttpCapture, JobOutput, RequestDetails, RunId, ScheduledJobPayload,
    TestKind, TestPayload, TestResult, TestStatus, WebServicePayload,
};
