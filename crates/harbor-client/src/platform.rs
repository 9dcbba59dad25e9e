use async_trait::async_trait;
use serde_json::{Value, json};

use crate::execution::{ExecutionHandle, ExecutionRecord, ExecutionRequest};
use crate::transport::HttpMethod;
use harbor_core::Result;

/// Remote integration platform as seen by the runners and the pipeline.
#[async_trait]
pub trait IntegrationPlatform: Send + Sync {
    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// Runtime used when a test names none.
    fn default_atom_id(&self) -> Option<&str>;

    /// Calls an account-scoped REST endpoint such as `/Process/query`.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx answer.
    async fn call(&self, endpoint: &str, method: HttpMethod, body: Option<Value>) -> Result<Value>;

    /// Starts a process execution.
    ///
    /// # Errors
    /// Returns an error when the platform rejects the request or returns no id.
    async fn execute_process(&self, request: &ExecutionRequest) -> Result<ExecutionHandle>;

    /// Fetches the current record for an execution.
    ///
    /// # Errors
    /// Returns an error when the status query fails.
    async fn poll_execution(&self, handle: &ExecutionHandle) -> Result<ExecutionRecord>;

    /// Downloads execution logs. Failures yield `None`.
    async fn execution_logs(&self, execution_id: &str) -> Option<String>;
}

/// `QueryFilter` body for a single-expression query.
pub fn query_filter(operator: &str, property: &str, argument: &str) -> Value {
    json!({
        "QueryFilter": {
            "expression": {
                "operator": operator,
                "property": property,
                "argument": [argument]
            }
        }
    })
}

/// `QueryFilter` body matching every object with a non-empty `property`.
pub fn query_all(property: &str) -> Value {
    query_filter("NOT_EQUALS", property, "")
}

/// Items of a query response's `result` array.
pub fn query_results(response: Value) -> Vec<Value> {
    match response {
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
