//! Process execution requests and the records polled back for them.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use harbor_core::{Error, JobOutput, Result};

/// Statuses meaning the execution has not finished yet.
pub const IN_PROGRESS_STATUSES: [&str; 3] = ["STARTED", "PENDING", "INPROCESS"];
/// Status assumed when a record reports none.
const ASSUMED_STATUS: &str = "PENDING";

/// A request to run a process on a runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Process to execute.
    pub process_id: String,
    /// Runtime to execute on.
    pub atom_id: String,
    /// Process properties.
    pub properties: BTreeMap<String, String>,
}

impl ExecutionRequest {
    /// Validates ids, falling back to `default_atom` when no atom is given.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the process id or every atom id is missing.
    pub fn resolve(
        process_id: &str,
        atom_id: Option<&str>,
        default_atom: Option<&str>,
        properties: BTreeMap<String, String>,
    ) -> Result<Self> {
        let process_id = process_id.trim();
        if process_id.is_empty() {
            return Err(Error::Config("Process ID is required".to_owned()));
        }
        let atom_id = atom_id
            .map(str::trim)
            .filter(|atom| !atom.is_empty())
            .or_else(|| default_atom.map(str::trim).filter(|atom| !atom.is_empty()))
            .ok_or_else(|| {
                Error::Config(
                    "Atom ID is required. Set BOOMI_DEFAULT_ATOM_ID or provide atomId in the test"
                        .to_owned(),
                )
            })?;

        Ok(Self {
            process_id: process_id.to_owned(),
            atom_id: atom_id.to_owned(),
            properties,
        })
    }

    /// Wire payload for the `ExecutionRequest` endpoint.
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("@type".to_owned(), json!("ExecutionRequest"));
        payload.insert("processId".to_owned(), json!(self.process_id));
        payload.insert("atomId".to_owned(), json!(self.atom_id));
        if !self.properties.is_empty() {
            let properties: Vec<Value> = self
                .properties
                .iter()
                .map(|(name, value)| {
                    json!({"@type": "ProcessProperty", "Name": name, "Value": value})
                })
                .collect();
            payload.insert(
                "ProcessProperties".to_owned(),
                json!({"@type": "ProcessProperties", "ProcessProperty": properties}),
            );
        }
        Value::Object(payload)
    }
}

/// What the platform handed back for an accepted execution request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionHandle {
    /// Execution (request) id.
    pub execution_id: String,
    /// Follow-up URL to poll, when provided.
    pub record_url: Option<String>,
    /// Raw acceptance response.
    pub raw: Value,
}

impl ExecutionHandle {
    /// Extracts the handle from an acceptance response.
    ///
    /// # Errors
    /// Returns an error carrying the platform message, or [`Error::Shape`]
    /// when the response has no recognizable id.
    pub fn from_response(raw: Value) -> Result<Self> {
        let execution_id = ["requestId", "executionId", "id"]
            .into_iter()
            .find_map(|key| raw.get(key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_owned);

        let Some(execution_id) = execution_id else {
            let message = raw.get("message").and_then(Value::as_str);
            let is_error = raw.get("@type").and_then(Value::as_str) == Some("Error");
            return Err(match message {
                Some(message) => Error::Other(format!("Platform error: {message}")),
                None if is_error => Error::Other(format!("Platform error: {raw}")),
                None => Error::Shape(format!("no execution ID returned. Response: {raw}")),
            });
        };

        Ok(Self {
            execution_id,
            record_url: raw
                .get("recordUrl")
                .and_then(Value::as_str)
                .map(str::to_owned),
            raw,
        })
    }
}

/// Shapes a polled execution response can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionShape {
    /// `202 Accepted`: still running.
    InProgress,
    /// `AsyncOperationResult` wrapper holding the first result.
    AsyncOperationResult(Value),
    /// A bare `ExecutionRecord`.
    ExecutionRecord(Value),
    /// Anything else, passed through unchanged.
    Unknown(Value),
}

impl ExecutionShape {
    /// Classifies a polled response.
    pub fn decode(status: u16, body: Value) -> Self {
        if status == 202 {
            return Self::InProgress;
        }
        match body.get("@type").and_then(Value::as_str) {
            Some("AsyncOperationResult") => {
                let first = body
                    .get("result")
                    .and_then(Value::as_array)
                    .and_then(|results| results.first())
                    .cloned();
                match first {
                    Some(record) => Self::AsyncOperationResult(record),
                    None => Self::Unknown(body),
                }
            }
            Some("ExecutionRecord") => Self::ExecutionRecord(body),
            other => {
                tracing::debug!("Unknown execution response format: {other:?}");
                Self::Unknown(body)
            }
        }
    }

    /// Normalizes the shape into a record.
    pub fn into_record(self) -> ExecutionRecord {
        match self {
            Self::InProgress => ExecutionRecord::in_progress(),
            Self::AsyncOperationResult(raw) | Self::ExecutionRecord(raw) | Self::Unknown(raw) => {
                ExecutionRecord::from_value(raw)
            }
        }
    }
}

/// Normalized execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    /// Platform status, absent when the record carried none.
    pub status: Option<String>,
    /// Execution id reported by the record.
    pub execution_id: Option<String>,
    /// Start time as reported.
    pub execution_time: Option<Value>,
    /// Duration in milliseconds.
    pub execution_duration: Option<i64>,
    /// Inbound documents.
    pub inbound_document_count: i64,
    /// Outbound documents.
    pub outbound_document_count: i64,
    /// Errored documents.
    pub error_document_count: i64,
    /// Platform message.
    pub message: Option<String>,
    /// Record as received.
    pub raw: Value,
}

impl ExecutionRecord {
    /// Placeholder for an execution that is still running.
    pub fn in_progress() -> Self {
        Self::from_value(json!({"status": "INPROCESS"}))
    }

    /// Reads a record, unwrapping `["Long", n]` numbers.
    pub fn from_value(raw: Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);
        let count = |key: &str| raw.get(key).and_then(long_value).unwrap_or(0);
        Self {
            status: text("status"),
            execution_id: text("executionId"),
            execution_time: raw.get("executionTime").cloned(),
            execution_duration: raw.get("executionDuration").and_then(long_value),
            inbound_document_count: count("inboundDocumentCount"),
            outbound_document_count: count("outboundDocumentCount"),
            error_document_count: count("errorDocumentCount"),
            message: text("message"),
            raw,
        }
    }

    /// Status, treating a missing one as `PENDING`.
    pub fn effective_status(&self) -> &str {
        self.status.as_deref().unwrap_or(ASSUMED_STATUS)
    }

    /// Whether the execution is still running.
    pub fn is_in_progress(&self) -> bool {
        IN_PROGRESS_STATUSES.contains(&self.effective_status())
    }

    /// Output summary used by job results.
    pub fn to_output(&self) -> JobOutput {
        JobOutput {
            status: self.effective_status().to_owned(),
            execution_time: self.execution_time.clone(),
            execution_duration: self.execution_duration,
            inbound_document_count: self.inbound_document_count,
            outbound_document_count: self.outbound_document_count,
            error_document_count: self.error_document_count,
            message: self.message.clone().unwrap_or_default(),
        }
    }
}

/// Reads a platform number: plain, numeric string, or `["Long", n]`.
fn long_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Array(items) => items.get(1).and_then(long_value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_falls_back_to_default_atom() {
        let request =
            ExecutionRequest::resolve(" proc-1 ", None, Some("atom-9"), BTreeMap::new()).unwrap();
        assert_eq!(request.process_id, "proc-1");
        assert_eq!(request.atom_id, "atom-9");
        let payload = request.to_payload();
        assert_eq!(payload["@type"], json!("ExecutionRequest"));
        assert!(payload.get("ProcessProperties").is_none());

        let error = ExecutionRequest::resolve("proc", Some(""), None, BTreeMap::new()).unwrap_err();
        assert!(error.to_string().starts_with("Atom ID is required"));
        ExecutionRequest::resolve("", Some("a"), None, BTreeMap::new()).unwrap_err();
    }

    #[test]
    fn test_request_payload_properties() {
        let mut properties = BTreeMap::new();
        properties.insert("agentPrompt".to_owned(), "hi".to_owned());
        let request = ExecutionRequest::resolve("p", Some("a"), None, properties).unwrap();
        let payload = request.to_payload();
        assert_eq!(
            payload["ProcessProperties"]["ProcessProperty"][0],
            json!({"@type": "ProcessProperty", "Name": "agentPrompt", "Value": "hi"})
        );
    }

    #[test]
    fn test_handle_extraction() {
        let handle = ExecutionHandle::from_response(json!({
            "requestId": "exec-1",
            "recordUrl": "https://platform.test/record/exec-1"
        }))
        .unwrap();
        assert_eq!(handle.execution_id, "exec-1");
        assert!(handle.record_url.is_some());

        let fallback = ExecutionHandle::from_response(json!({"id": "exec-2"})).unwrap();
        assert_eq!(fallback.execution_id, "exec-2");

        let error = ExecutionHandle::from_response(json!({"message": "Process not deployed"}))
            .unwrap_err();
        assert_eq!(error.to_string(), "Platform error: Process not deployed");
        let shape = ExecutionHandle::from_response(json!({"ok": true})).unwrap_err();
        assert!(matches!(shape, Error::Shape(_)));
    }

    #[test]
    fn test_shape_decoding() {
        assert_eq!(ExecutionShape::decode(202, Value::Null), ExecutionShape::InProgress);

        let wrapped = ExecutionShape::decode(
            200,
            json!({
                "@type": "AsyncOperationResult",
                "result": [{"status": "COMPLETE", "executionDuration": ["Long", 1534], "outboundDocumentCount": 12}]
            }),
        );
        let record = wrapped.into_record();
        assert_eq!(record.status.as_deref(), Some("COMPLETE"));
        assert_eq!(record.execution_duration, Some(1534));
        assert_eq!(record.outbound_document_count, 12);
        assert!(!record.is_in_progress());

        let direct = ExecutionShape::decode(200, json!({"@type": "ExecutionRecord", "status": "ERROR"}));
        assert!(matches!(direct, ExecutionShape::ExecutionRecord(_)));

        let unknown = ExecutionShape::decode(200, json!({"something": 1}));
        assert!(matches!(unknown, ExecutionShape::Unknown(_)));
        assert!(unknown.into_record().is_in_progress(), "missing status reads as PENDING");
    }
}
