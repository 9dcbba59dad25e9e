use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{AgentInvoker, Invocation};
use crate::environment::RunEnvironment;
use crate::execution::{ExecutionDriver, PollOutcome};
use harbor_client::ExecutionRequest;
use harbor_core::spec::render;
use harbor_core::{
    AgentPayload, AgentReply, AgentSpec, Error, Phase, Result, RunStatus, StatusRecord,
};

/// Content used when the process finishes without a message.
const COMPLETED_WITHOUT_MESSAGE: &str = "Agent process completed";

/// Runs a platform process that wraps the agent and polls it to completion.
pub struct ProcessInvoker {
    env: RunEnvironment,
}

impl ProcessInvoker {
    /// Creates an invoker executing on the environment's platform.
    pub fn new(env: RunEnvironment) -> Self {
        Self { env }
    }
}

#[async_trait]
impl AgentInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        spec: &AgentSpec,
        status: &RunStatus,
        payload: &mut AgentPayload,
    ) -> Result<Invocation> {
        self.env.require_platform()?;
        let process_id = spec
            .process_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("Process ID is required for process-based agent testing".to_owned())
            })?;

        status.phase(Phase::Invoking, "Executing process with agent step...");
        let request = ExecutionRequest::resolve(
            process_id,
            spec.atom_id.as_deref(),
            self.env.platform.default_atom_id(),
            agent_properties(spec),
        )?;

        let driver =
            ExecutionDriver::new(self.env.platform.as_ref(), status, self.env.poll_interval_ms)
                .with_phase(Phase::Waiting);
        let handle = driver.start(&request).await?;
        payload.execution_id = Some(handle.execution_id.clone());
        status.update(
            StatusRecord::new(Phase::Waiting, "Waiting for agent response...")
                .with_execution_id(&handle.execution_id),
        );

        let record = match driver.wait(&handle, spec.timeout).await {
            PollOutcome::Finished(record) => record,
            PollOutcome::TimedOut(_) => {
                return Err(Error::Other(format!(
                    "Agent execution timed out after {}ms",
                    spec.timeout
                )));
            }
        };

        let content = record
            .message
            .clone()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| COMPLETED_WITHOUT_MESSAGE.to_owned());
        let reply = AgentReply {
            content,
            status: record.effective_status().to_owned(),
            status_code: None,
            status_text: None,
            execution_time: record
                .execution_duration
                .and_then(|duration| u64::try_from(duration).ok()),
            raw: None,
            trace: spec.options.capture_trace.then(|| record.raw.clone()),
        };
        Ok(Invocation {
            reply,
            assertions: Vec::new(),
        })
    }
}

/// Process properties carrying the prompt and the conversation so far.
pub fn agent_properties(spec: &AgentSpec) -> BTreeMap<String, String> {
    let history = spec
        .conversation_history
        .as_ref()
        .filter(|history| !history.is_null())
        .map_or_else(|| "[]".to_owned(), render);
    BTreeMap::from([
        ("agentPrompt".to_owned(), spec.prompt.clone()),
        ("conversationHistory".to_owned(), history),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json};

    #[test]
    fn test_agent_properties() {
        let spec: AgentSpec = from_value(json!({
            "prompt": "Summarize",
            "testType": "process",
            "conversationHistory": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        let properties = agent_properties(&spec);
        assert_eq!(properties["agentPrompt"], "Summarize");
        assert_eq!(
            properties["conversationHistory"],
            "[{\"content\":\"hi\",\"role\":\"user\"}]"
        );

        let bare: AgentSpec = from_value(json!({"prompt": "p"})).unwrap();
        assert_eq!(agent_properties(&bare)["conversationHistory"], "[]");
    }
}
