//! Read-only listings of platform objects.

use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::platform::{IntegrationPlatform, query_all, query_filter, query_results};
use crate::transport::HttpMethod;
use harbor_core::Result;

/// Default number of execution records returned.
pub const DEFAULT_EXECUTION_LIMIT: usize = 20;

/// Summary of a successful connection check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    /// Runtimes visible to the account.
    pub atoms_found: usize,
    /// Processes visible to the account.
    pub processes_found: usize,
    /// `{id, name, status}` per runtime.
    pub atoms: Vec<Value>,
    /// Configured default runtime, or `(not set)`.
    pub default_atom_id: String,
}

/// Listings over an [`IntegrationPlatform`].
#[derive(Clone)]
pub struct Catalog {
    platform: Arc<dyn IntegrationPlatform>,
}

impl Catalog {
    /// Wraps a platform.
    pub fn new(platform: Arc<dyn IntegrationPlatform>) -> Self {
        Self { platform }
    }

    async fn query(&self, endpoint: &str, filter: Value) -> Result<Vec<Value>> {
        let response = self
            .platform
            .call(endpoint, HttpMethod::Post, Some(filter))
            .await?;
        Ok(query_results(response))
    }

    /// Every process in the account.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn processes(&self) -> Result<Vec<Value>> {
        self.query("/Process/query", query_all("id")).await
    }

    /// Every runtime in the account.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn atoms(&self) -> Result<Vec<Value>> {
        self.query("/Atom/query", query_all("id")).await
    }

    /// Every environment in the account.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn environments(&self) -> Result<Vec<Value>> {
        self.query("/Environment/query", query_all("id")).await
    }

    /// One environment by id.
    ///
    /// # Errors
    /// Returns an error when the call fails.
    pub async fn environment(&self, environment_id: &str) -> Result<Value> {
        self.platform
            .call(&format!("/Environment/{environment_id}"), HttpMethod::Get, None)
            .await
    }

    /// Recent execution records, optionally for one process.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn executions(&self, process_id: Option<&str>, limit: usize) -> Result<Vec<Value>> {
        let filter = match process_id {
            Some(process_id) => query_filter("EQUALS", "processId", process_id),
            None => json!({"QueryFilter": {}}),
        };
        let mut records = self.query("/ExecutionRecord/query", filter).await?;
        records.truncate(limit);
        Ok(records)
    }

    /// Lists runtimes and processes to prove the credentials work.
    ///
    /// # Errors
    /// Returns an error when either listing fails.
    pub async fn check_connection(&self) -> Result<ConnectionReport> {
        tracing::info!("Testing platform API connection");
        let atoms = self.atoms().await?;
        let processes = self.processes().await?;
        Ok(ConnectionReport {
            atoms_found: atoms.len(),
            processes_found: processes.len(),
            atoms: atoms
                .iter()
                .map(|atom| json!({"id": atom.get("id"), "name": atom.get("name"), "status": atom.get("status")}))
                .collect(),
            default_atom_id: self
                .platform
                .default_atom_id()
                .unwrap_or("(not set)")
                .to_owned(),
        })
    }
}
