//! Live progress records keyed by run id.
//!
//! A [`StatusRegistry`] is a cheap cloneable handle shared by every runner and
//! any observer. Runners hold a [`RunStatus`] guard for the duration of a run;
//! dropping the guard removes the record, so a finished run never lingers
//! whichever way it exits.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::sync::IgnoreLock;
use crate::types::RunId;

/// Message reported for run ids with no live record.
const NOT_FOUND_MESSAGE: &str = "Test not found or completed";

/// Coarse stage a run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Run registered, nothing sent yet.
    Starting,
    /// Request or execution in flight.
    Executing,
    /// Waiting on a platform execution.
    Polling,
    /// Fetching execution logs.
    Logs,
    /// Evaluating assertions.
    Validating,
    /// Publishing an event.
    Publishing,
    /// Sleeping before verification.
    Waiting,
    /// Reading back through a consumer.
    Verifying,
    /// Fabricating simulated events.
    Simulating,
    /// Calling an agent.
    Invoking,
    /// Resolving a component.
    Lookup,
    /// Creating a package.
    Packaging,
    /// Deploying to environments.
    Deploying,
    /// Running a post-deploy smoke test.
    Testing,
    /// No record exists.
    Unknown,
}

/// Snapshot of a run's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    /// Current phase.
    pub phase: Phase,
    /// Human-readable progress message.
    pub message: String,
    /// Poll attempt, when polling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<u32>,
    /// Poll budget, when polling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,
    /// Platform execution id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Last status reported by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<String>,
    /// Deployment target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
}

impl StatusRecord {
    /// Creates a record for the given phase.
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            poll: None,
            max_polls: None,
            execution_id: None,
            remote_status: None,
            environment: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches poll progress.
    #[must_use]
    pub fn with_poll(mut self, poll: u32, max_polls: u32) -> Self {
        self.poll = Some(poll);
        self.max_polls = Some(max_polls);
        self
    }

    /// Attaches the platform execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Attaches the last remote status.
    #[must_use]
    pub fn with_remote_status(mut self, status: impl Into<String>) -> Self {
        self.remote_status = Some(status.into());
        self
    }

    /// Attaches a deployment environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

/// Shared map of live run records.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    records: Arc<Mutex<HashMap<RunId, StatusRecord>>>,
}

impl StatusRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run in the `starting` phase and returns its guard.
    pub fn start(&self, run_id: RunId, message: impl Into<String>) -> RunStatus {
        self.update(&run_id, StatusRecord::new(Phase::Starting, message));
        RunStatus {
            registry: self.clone(),
            run_id,
        }
    }

    /// Replaces the record for a run, stamping it with the current time.
    pub fn update(&self, run_id: &RunId, mut record: StatusRecord) {
        record.timestamp = Utc::now();
        tracing::trace!(run_id = %run_id, phase = ?record.phase, "{}", record.message);
        self.records
            .lock_ignore_poison()
            .insert(run_id.clone(), record);
    }

    /// Removes a run's record.
    pub fn clear(&self, run_id: &RunId) {
        self.records.lock_ignore_poison().remove(run_id);
    }

    /// Returns the live record for a run.
    pub fn peek(&self, run_id: &RunId) -> Option<StatusRecord> {
        self.records.lock_ignore_poison().get(run_id).cloned()
    }

    /// Returns the live record, or an `unknown` placeholder.
    pub fn peek_or_unknown(&self, run_id: &RunId) -> StatusRecord {
        self.peek(run_id)
            .unwrap_or_else(|| StatusRecord::new(Phase::Unknown, NOT_FOUND_MESSAGE))
    }

    /// Snapshot of every live record, ordered by run id.
    pub fn active(&self) -> BTreeMap<RunId, StatusRecord> {
        self.records
            .lock_ignore_poison()
            .iter()
            .map(|(run_id, record)| (run_id.clone(), record.clone()))
            .collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.lock_ignore_poison().len()
    }

    /// Whether no run is live.
    pub fn is_empty(&self) -> bool {
        self.records.lock_ignore_poison().is_empty()
    }
}

/// Guard for one run's record; clears it on drop.
#[derive(Debug)]
pub struct RunStatus {
    registry: StatusRegistry,
    run_id: RunId,
}

impl RunStatus {
    /// Id of the guarded run.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Replaces the guarded run's record.
    pub fn update(&self, record: StatusRecord) {
        self.registry.update(&self.run_id, record);
    }

    /// Shorthand for a record with only a phase and a message.
    pub fn phase(&self, phase: Phase, message: impl Into<String>) {
        self.update(StatusRecord::new(phase, message));
    }
}

impl Drop for RunStatus {
    fn drop(&mut self) {
        self.registry.clear(&self.run_id);
    }
}
