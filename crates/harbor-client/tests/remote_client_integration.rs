//! Integration tests for `RemoteClient` over a scripted transport.
//!
//! Covers URL construction, authorization, error hints, execution polling
//! shapes, log downloads and the listing helpers.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::print_stdout,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use harbor_client::{
    Catalog, Deployments, ExecutionHandle, ExecutionRequest, HttpMethod, HttpResponse,
    IntegrationPlatform, ListenerStatus, MockReply, MockTransport, RemoteClient,
};
use harbor_core::{Error, PlatformConfig};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

const BASE: &str = "https://platform.test/api/rest/v1";

fn config() -> PlatformConfig {
    PlatformConfig {
        account_id: Some("acct-1".to_owned()),
        username: Some("user".to_owned()),
        password: Some("pass".to_owned()),
        default_atom_id: Some("atom-default".to_owned()),
        base_url: BASE.to_owned(),
    }
}

fn client(transport: &MockTransport) -> RemoteClient {
    RemoteClient::with_transport(config(), Arc::new(transport.clone()))
}

#[tokio::test]
async fn test_call_builds_account_url_and_basic_auth() {
    let transport = MockTransport::new().with_response(
        "/Atom/query",
        HttpResponse::json_body(200, &json!({"result": [{"id": "a1"}]})),
    );
    let client = client(&transport);

    let value = client
        .call("/Atom/query", HttpMethod::Post, Some(json!({"QueryFilter": {}})))
        .await
        .unwrap();
    assert_eq!(value["result"][0]["id"], json!("a1"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, format!("{BASE}/acct-1/Atom/query"));
    assert_eq!(requests[0].header("authorization"), Some("Basic dXNlcjpwYXNz"));
    assert_eq!(requests[0].header("accept"), Some("application/json"));
}

#[tokio::test]
async fn test_call_without_credentials_fails_before_sending() {
    let transport = MockTransport::new();
    let client = RemoteClient::with_transport(
        PlatformConfig::default(),
        Arc::new(transport.clone()),
    );
    let error = client.call("/Atom/query", HttpMethod::Get, None).await.unwrap_err();
    assert!(matches!(error, Error::Config(_)));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_non_json_success_falls_back_to_text() {
    let transport =
        MockTransport::new().with_response("/DeployedPackage/d-1", HttpResponse::new(200, "OK"));
    let value = client(&transport)
        .call("/DeployedPackage/d-1", HttpMethod::Delete, None)
        .await
        .unwrap();
    assert_eq!(value, Value::String("OK".to_owned()));
}

#[tokio::test]
async fn test_remote_errors_carry_hints() {
    let transport = MockTransport::new().with_response(
        "/ExecutionRequest",
        HttpResponse::json_body(401, &json!({"message": "Unauthorized"})),
    );
    let request = ExecutionRequest::resolve("proc", None, Some("atom"), BTreeMap::new()).unwrap();
    let error = client(&transport).execute_process(&request).await.unwrap_err();
    let Error::Remote { status, message } = error else {
        panic!("expected remote error");
    };
    assert_eq!(status, 401);
    assert!(message.starts_with("Platform API Error 401: Unauthorized"));
    assert!(message.contains("BOOMI_USERNAME"));
}

#[tokio::test]
async fn test_execute_and_poll_by_record_url() {
    let transport = MockTransport::new()
        .with_response(
            "/ExecutionRequest",
            HttpResponse::json_body(
                200,
                &json!({"requestId": "exec-9", "recordUrl": "https://platform.test/record/exec-9"}),
            ),
        )
        .with_response(
            "/record/exec-9",
            HttpResponse::json_body(
                200,
                &json!({
                    "@type": "AsyncOperationResult",
                    "result": [{"status": "COMPLETE", "executionId": "exec-9", "executionDuration": ["Long", 900]}]
                }),
            ),
        );
    let client = client(&transport);
    let request = ExecutionRequest::resolve("proc", None, Some("atom"), BTreeMap::new()).unwrap();

    let handle = client.execute_process(&request).await.unwrap();
    assert_eq!(handle.execution_id, "exec-9");
    let record = client.poll_execution(&handle).await.unwrap();
    assert_eq!(record.status.as_deref(), Some("COMPLETE"));
    assert_eq!(record.execution_duration, Some(900));

    let sent: Value = serde_json::from_str(transport.requests()[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(sent["processId"], json!("proc"));
    assert_eq!(sent["atomId"], json!("atom"));
}

#[tokio::test]
async fn test_accepted_status_reads_as_in_progress() {
    let transport =
        MockTransport::new().with_response("/record/", HttpResponse::new(202, ""));
    let handle = ExecutionHandle {
        execution_id: "exec-1".to_owned(),
        record_url: Some("https://platform.test/record/exec-1".to_owned()),
        raw: Value::Null,
    };
    let record = client(&transport).poll_execution(&handle).await.unwrap();
    assert!(record.is_in_progress());
    assert_eq!(record.effective_status(), "INPROCESS");
}

#[tokio::test]
async fn test_logs_download_and_failure() {
    let transport = MockTransport::new()
        .with_response(
            "/ProcessLog",
            HttpResponse::json_body(200, &json!({"url": "https://logs.test/exec-1.zip"})),
        )
        .with_response("logs.test", HttpResponse::new(200, "log line"));
    assert_eq!(
        client(&transport).execution_logs("exec-1").await.as_deref(),
        Some("log line")
    );

    let failing = MockTransport::new().with_reply("/ProcessLog", MockReply::Fail("down".to_owned()));
    assert!(client(&failing).execution_logs("exec-1").await.is_none());
}

#[tokio::test]
async fn test_listings_and_deployments() {
    let transport = MockTransport::new()
        .with_response(
            "/Atom/query",
            HttpResponse::json_body(200, &json!({"result": [{"id": "a1", "name": "Cloud", "status": "ONLINE"}]})),
        )
        .with_response(
            "/Process/query",
            HttpResponse::json_body(200, &json!({"result": [{"id": "p1"}, {"id": "p2"}]})),
        )
        .with_response(
            "/DeployedPackage",
            HttpResponse::json_body(200, &json!({"deploymentId": "d-1"})),
        );
    let platform: Arc<dyn IntegrationPlatform> = Arc::new(client(&transport));

    let report = Catalog::new(Arc::clone(&platform)).check_connection().await.unwrap();
    assert_eq!(report.atoms_found, 1);
    assert_eq!(report.processes_found, 2);
    assert_eq!(report.default_atom_id, "atom-default");

    let deployment = Deployments::new(platform)
        .deploy_package("env-1", "pkg-1", None, ListenerStatus::Paused)
        .await
        .unwrap();
    assert_eq!(deployment["deploymentId"], json!("d-1"));
    let sent: Value =
        serde_json::from_str(transport.requests().last().unwrap().body.as_deref().unwrap()).unwrap();
    assert_eq!(sent["listenerStatus"], json!("PAUSED"));
    assert!(sent["notes"].as_str().unwrap().starts_with("Deployed via CI/CD at"));
}
