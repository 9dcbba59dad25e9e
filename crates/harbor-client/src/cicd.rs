//! Packaging and deployment operations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::platform::{IntegrationPlatform, query_all, query_filter, query_results};
use crate::transport::HttpMethod;
use harbor_core::Result;

/// Listener state a deployment starts in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerStatus {
    /// Listeners start immediately.
    #[default]
    Running,
    /// Listeners start paused.
    Paused,
}

/// Kind of component looked up by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComponentKind {
    /// A process.
    #[default]
    Process,
    /// Any other component.
    Component,
}

impl ComponentKind {
    fn object_type(self) -> &'static str {
        match self {
            Self::Process => "Process",
            Self::Component => "Component",
        }
    }
}

/// Receipt for an undeploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Undeployed {
    /// Always `true` once the call returned.
    pub success: bool,
    /// Removed deployment.
    pub deployment_id: String,
}

/// Packaging and deployment over an [`IntegrationPlatform`].
#[derive(Clone)]
pub struct Deployments {
    platform: Arc<dyn IntegrationPlatform>,
}

impl Deployments {
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

    /// Finds the first component with the given name.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn component_by_name(&self, name: &str, kind: ComponentKind) -> Result<Option<Value>> {
        tracing::info!("Looking up component: {name}");
        let endpoint = format!("/{}/query", kind.object_type());
        let found = self
            .query(&endpoint, query_filter("EQUALS", "name", name))
            .await?;
        Ok(found.into_iter().next())
    }

    /// Packaged components, optionally for one component.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn packages(&self, component_id: Option<&str>) -> Result<Vec<Value>> {
        let filter = component_id.map_or_else(
            || query_all("packageId"),
            |component_id| query_filter("EQUALS", "componentId", component_id),
        );
        self.query("/PackagedComponent/query", filter).await
    }

    /// One packaged component by id.
    ///
    /// # Errors
    /// Returns an error when the call fails.
    pub async fn package(&self, package_id: &str) -> Result<Value> {
        self.platform
            .call(&format!("/PackagedComponent/{package_id}"), HttpMethod::Get, None)
            .await
    }

    /// Packages a component version.
    ///
    /// # Errors
    /// Returns an error when the platform rejects the package.
    pub async fn create_package(
        &self,
        component_id: &str,
        package_version: &str,
        notes: Option<&str>,
    ) -> Result<Value> {
        tracing::info!("Creating package for component {component_id}, version {package_version}");
        let notes = notes
            .filter(|notes| !notes.is_empty())
            .map_or_else(|| format!("Package created via CI/CD at {}", Utc::now().to_rfc3339()), str::to_owned);
        let payload = json!({
            "componentId": component_id,
            "packageVersion": package_version,
            "notes": notes,
        });
        let created = self
            .platform
            .call("/PackagedComponent", HttpMethod::Post, Some(payload))
            .await?;
        tracing::info!("Package created: {}", created.get("packageId").unwrap_or(&serde_json::Value::Null));
        Ok(created)
    }

    /// Deployments, optionally in one environment.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn deployments(&self, environment_id: Option<&str>) -> Result<Vec<Value>> {
        let filter = environment_id.map_or_else(
            || query_all("deploymentId"),
            |environment_id| query_filter("EQUALS", "environmentId", environment_id),
        );
        self.query("/DeployedPackage/query", filter).await
    }

    /// Deploys a package to an environment.
    ///
    /// # Errors
    /// Returns an error when the platform rejects the deployment.
    pub async fn deploy_package(
        &self,
        environment_id: &str,
        package_id: &str,
        notes: Option<&str>,
        listener_status: ListenerStatus,
    ) -> Result<Value> {
        tracing::info!("Deploying package {package_id} to environment {environment_id}");
        let notes = notes
            .filter(|notes| !notes.is_empty())
            .map_or_else(|| format!("Deployed via CI/CD at {}", Utc::now().to_rfc3339()), str::to_owned);
        let payload = json!({
            "environmentId": environment_id,
            "packageId": package_id,
            "notes": notes,
            "listenerStatus": listener_status,
        });
        self.platform
            .call("/DeployedPackage", HttpMethod::Post, Some(payload))
            .await
    }

    /// Removes a deployment.
    ///
    /// # Errors
    /// Returns an error when the platform rejects the removal.
    pub async fn undeploy(&self, deployment_id: &str) -> Result<Undeployed> {
        tracing::info!("Undeploying: {deployment_id}");
        self.platform
            .call(&format!("/DeployedPackage/{deployment_id}"), HttpMethod::Delete, None)
            .await?;
        Ok(Undeployed {
            success: true,
            deployment_id: deployment_id.to_owned(),
        })
    }

    /// Every deployment of a component.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn history(&self, component_id: &str) -> Result<Vec<Value>> {
        self.query(
            "/DeployedPackage/query",
            query_filter("EQUALS", "componentId", component_id),
        )
        .await
    }
}
