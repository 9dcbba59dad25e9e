//! Network side of harbor: the HTTP seam, authorization helpers and the
//! remote integration platform client.
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

/// Authorization header construction.
pub mod auth;
/// Read-only platform listings.
pub mod catalog;
/// Packaging and deployment operations.
pub mod cicd;
/// REST client for the platform.
pub mod client;
/// Execution requests and polled records.
pub mod execution;
/// Scripted doubles for tests.
pub mod mock;
/// The platform interface consumed by runners.
pub mod platform;
/// HTTP transport seam.
pub mod transport;

pub use catalog::{Catalog, ConnectionReport, DEFAULT_EXECUTION_LIMIT};
pub use cicd::{ComponentKind, Deployments, ListenerStatus, Undeployed};
pub use client::RemoteClient;
pub use execution::{
    ExecutionHandle, ExecutionRecord, ExecutionRequest, ExecutionShape, IN_PROGRESS_STATUSES,
};
pub use mock::{CallReply, MockPlatform, MockReply, MockTransport};
pub use platform::IntegrationPlatform;
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, reason_phrase,
    send_with_timeout, set_header,
};
