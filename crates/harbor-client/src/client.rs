//! REST client for the remote integration platform.

use async_trait::async_trait;
use serde_json::{Value, from_str, json};
use std::sync::Arc;

use crate::auth;
use crate::execution::{ExecutionHandle, ExecutionRecord, ExecutionRequest, ExecutionShape};
use crate::platform::{IntegrationPlatform, query_filter, query_results};
use crate::transport::{HttpMethod, HttpRequest, HttpTransport, ReqwestTransport, send_with_timeout};
use harbor_core::{Error, PlatformConfig, Result};

/// Upper bound for a single platform call.
const PLATFORM_TIMEOUT_MS: u64 = 30_000;

/// Client for the platform's account-scoped REST API.
#[derive(Clone)]
pub struct RemoteClient {
    /// Credentials and base URL.
    config: PlatformConfig,
    /// `Basic` header, present when credentials are.
    auth_header: Option<String>,
    /// Network seam.
    transport: Arc<dyn HttpTransport>,
    /// Per-call timeout in milliseconds.
    timeout_ms: u64,
}

impl RemoteClient {
    /// Creates a client that talks over the network.
    pub fn new(config: PlatformConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Creates a client on top of the given transport.
    pub fn with_transport(config: PlatformConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let auth_header = match (&config.username, &config.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(auth::basic(username, password))
            }
            _ => None,
        };
        Self {
            config,
            auth_header,
            transport,
            timeout_ms: PLATFORM_TIMEOUT_MS,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Account-scoped URL for an endpoint.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}{endpoint}",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_id.as_deref().unwrap_or_default()
        )
    }

    fn authorization(&self) -> Result<&str> {
        self.auth_header
            .as_deref()
            .ok_or_else(|| Error::Config("Platform credentials not configured".to_owned()))
    }

    /// Fetches an execution record from a follow-up URL.
    ///
    /// # Errors
    /// Returns [`Error::Remote`] for statuses other than 2xx.
    pub async fn get_execution_by_url(&self, record_url: &str) -> Result<ExecutionRecord> {
        tracing::debug!("GET {record_url}");
        let request = HttpRequest::get(record_url)
            .with_header("Authorization", self.authorization()?)
            .with_header("Accept", "application/json");
        let response = send_with_timeout(self.transport.as_ref(), request, self.timeout_ms).await?;

        if response.status == 202 {
            tracing::debug!("Execution still in progress (202)");
            return Ok(ExecutionRecord::in_progress());
        }
        if !response.is_success() {
            return Err(Error::Remote {
                status: response.status,
                message: format!(
                    "Failed to get execution status: {} - {}",
                    response.status, response.body
                ),
            });
        }

        let body: Value = from_str(&response.body)?;
        Ok(ExecutionShape::decode(response.status, body).into_record())
    }

    /// Looks an execution up by id through the record query endpoint.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn find_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let response = self
            .call(
                "/ExecutionRecord/query",
                HttpMethod::Post,
                Some(query_filter("EQUALS", "executionId", execution_id)),
            )
            .await?;
        Ok(query_results(response)
            .into_iter()
            .next()
            .map(ExecutionRecord::from_value))
    }

    async fn download_logs(&self, execution_id: &str) -> Result<Option<String>> {
        let request = json!({"@type": "ProcessLog", "executionId": execution_id, "logLevel": "ALL"});
        let response = self
            .call("/ProcessLog", HttpMethod::Post, Some(request))
            .await?;
        let Some(url) = response.get("url").and_then(Value::as_str) else {
            return Ok(None);
        };

        tracing::debug!("Log download URL: {url}");
        let download = HttpRequest::get(url).with_header("Authorization", self.authorization()?);
        let logs = send_with_timeout(self.transport.as_ref(), download, self.timeout_ms).await?;
        Ok((logs.is_success() && !logs.body.is_empty()).then_some(logs.body))
    }
}

/// Error message for a failed platform call, with a hint per status.
fn remote_error_message(status: u16, body: &str) -> String {
    let detail = from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.to_owned());
    let hint = match status {
        400 => "\n\nPossible causes:\n- Invalid Process ID\n- Invalid Atom ID\n- Process not deployed to Atom",
        401 => "\n\nCheck: BOOMI_USERNAME format should be BOOMI_TOKEN.your.email@company.com",
        403 => "\n\nCheck: User needs API Access role on the platform",
        404 => "\n\nCheck: Account ID, Process ID, or Atom ID may be incorrect",
        _ => "",
    };
    format!("Platform API Error {status}: {detail}{hint}")
}

#[async_trait]
impl IntegrationPlatform for RemoteClient {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn default_atom_id(&self) -> Option<&str> {
        self.config
            .default_atom_id
            .as_deref()
            .filter(|atom| !atom.is_empty())
    }

    async fn call(&self, endpoint: &str, method: HttpMethod, body: Option<Value>) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        tracing::info!("{method} {url}");

        let mut request = HttpRequest::new(method, url)
            .with_header("Authorization", self.authorization()?)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");
        if let Some(body) = body {
            tracing::debug!("Request body: {body}");
            request = request.with_body(body.to_string());
        }

        let response = send_with_timeout(self.transport.as_ref(), request, self.timeout_ms).await?;
        tracing::debug!("Response status: {}", response.status);

        if !response.is_success() {
            tracing::warn!("Platform error response: {}", response.body);
            return Err(Error::Remote {
                status: response.status,
                message: remote_error_message(response.status, &response.body),
            });
        }

        Ok(from_str(&response.body).unwrap_or(Value::String(response.body)))
    }

    async fn execute_process(&self, request: &ExecutionRequest) -> Result<ExecutionHandle> {
        tracing::info!(
            process_id = %request.process_id,
            atom_id = %request.atom_id,
            "Executing process"
        );
        let response = self
            .call("/ExecutionRequest", HttpMethod::Post, Some(request.to_payload()))
            .await?;
        let handle = ExecutionHandle::from_response(response)?;
        tracing::info!("Execution started: {}", handle.execution_id);
        Ok(handle)
    }

    async fn poll_execution(&self, handle: &ExecutionHandle) -> Result<ExecutionRecord> {
        match &handle.record_url {
            Some(url) => self.get_execution_by_url(url).await,
            None => Ok(self
                .find_execution(&handle.execution_id)
                .await?
                .unwrap_or_else(ExecutionRecord::in_progress)),
        }
    }

    async fn execution_logs(&self, execution_id: &str) -> Option<String> {
        match self.download_logs(execution_id).await {
            Ok(logs) => logs,
            Err(error) => {
                tracing::warn!("Logs not available for {execution_id}: {error}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_hints() {
        let not_found = remote_error_message(404, "{\"message\": \"No such process\"}");
        assert!(not_found.starts_with("Platform API Error 404: No such process"));
        assert!(not_found.contains("Account ID"));

        let plain = remote_error_message(500, "boom");
        assert_eq!(plain, "Platform API Error 500: boom");
    }

    #[test]
    fn test_endpoint_url() {
        let config = PlatformConfig {
            account_id: Some("acct-1".to_owned()),
            base_url: "https://platform.test/api/".to_owned(),
            ..PlatformConfig::default()
        };
        let client = RemoteClient::new(config);
        assert_eq!(
            client.endpoint_url("/Atom/query"),
            "https://platform.test/api/acct-1/Atom/query"
        );
        assert!(!client.is_configured());
        assert!(client.default_atom_id().is_none());
    }
}
