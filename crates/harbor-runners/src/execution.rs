//! Execute-then-poll driver shared by scheduled job and agent process runs.

use core::time::Duration;
use tokio::time::sleep;

use harbor_client::{ExecutionHandle, ExecutionRecord, ExecutionRequest, IntegrationPlatform};
use harbor_core::{Phase, Result, RunStatus, StatusRecord};

/// How polling ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The execution left the in-progress statuses.
    Finished(ExecutionRecord),
    /// The poll budget ran out; carries the last record seen.
    TimedOut(Option<ExecutionRecord>),
}

/// Number of polls that fit in `timeout_ms`.
pub fn max_polls(timeout_ms: u64, interval_ms: u64) -> u32 {
    u32::try_from(timeout_ms.div_ceil(interval_ms.max(1))).unwrap_or(u32::MAX)
}

/// Starts an execution and polls it to completion.
pub struct ExecutionDriver<'run> {
    platform: &'run dyn IntegrationPlatform,
    status: &'run RunStatus,
    interval_ms: u64,
    phase: Phase,
}

impl<'run> ExecutionDriver<'run> {
    /// Creates a driver reporting progress in the `polling` phase.
    pub fn new(platform: &'run dyn IntegrationPlatform, status: &'run RunStatus, interval_ms: u64) -> Self {
        Self {
            platform,
            status,
            interval_ms,
            phase: Phase::Polling,
        }
    }

    /// Reports progress under a different phase.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Sends the execution request.
    ///
    /// # Errors
    /// Returns the platform error when the request is rejected.
    pub async fn start(&self, request: &ExecutionRequest) -> Result<ExecutionHandle> {
        self.status.phase(Phase::Executing, "Sending execution request to the platform...");
        let handle = self.platform.execute_process(request).await?;
        tracing::info!(
            execution_id = %handle.execution_id,
            record_url = handle.record_url.as_deref().unwrap_or("(none)"),
            "Execution started"
        );
        Ok(handle)
    }

    /// Polls until the execution finishes or `ceil(timeout / interval)` polls are spent.
    ///
    /// Poll errors are logged and the next poll proceeds.
    pub async fn wait(&self, handle: &ExecutionHandle, timeout_ms: u64) -> PollOutcome {
        let budget = max_polls(timeout_ms, self.interval_ms);
        let mut last = None;

        for poll in 1..=budget {
            sleep(Duration::from_millis(self.interval_ms)).await;
            self.status.update(
                StatusRecord::new(self.phase, format!("Polling for status ({poll}/{budget})..."))
                    .with_poll(poll, budget)
                    .with_execution_id(&handle.execution_id),
            );
            tracing::debug!("Poll {poll}/{budget}");

            match self.platform.poll_execution(handle).await {
                Ok(record) => {
                    let remote_status = record.effective_status().to_owned();
                    tracing::debug!("Status: {remote_status}");
                    self.status.update(
                        StatusRecord::new(
                            self.phase,
                            format!("Status: {remote_status} ({poll}/{budget})"),
                        )
                        .with_poll(poll, budget)
                        .with_execution_id(&handle.execution_id)
                        .with_remote_status(&remote_status),
                    );
                    if !record.is_in_progress() {
                        tracing::info!("Execution finished with status: {remote_status}");
                        return PollOutcome::Finished(record);
                    }
                    last = Some(record);
                }
                Err(error) => tracing::warn!("Poll error (will retry): {error}"),
            }
        }

        PollOutcome::TimedOut(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls_rounds_up() {
        assert_eq!(max_polls(5_000, 2_000), 3);
        assert_eq!(max_polls(6_000, 2_000), 3);
        assert_eq!(max_polls(60_000, 2_000), 30);
        assert_eq!(max_polls(1, 2_000), 1);
        assert_eq!(max_polls(0, 2_000), 0);
        assert_eq!(max_polls(10, 0), 10);
    }
}
