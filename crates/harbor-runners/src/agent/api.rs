use async_trait::async_trait;
use serde_json::{Value, from_str, json};
use std::sync::Arc;
use tokio::time::Instant;

use super::{AgentInvoker, Invocation};
use harbor_client::{HttpMethod, HttpRequest, HttpTransport, auth, send_with_timeout};
use harbor_core::extract::extract_content;
use harbor_core::{
    AgentAuthType, AgentPayload, AgentReply, AgentSpec, AssertionResult, Error, Phase, Result,
    RunStatus,
};

/// Body sent when no request template is given.
pub const DEFAULT_BODY_TEMPLATE: &str = r#"{"prompt": "{{prompt}}"}"#;
const EMPTY_HISTORY: &str = "[]";

/// Calls an agent's web service endpoint.
pub struct ApiInvoker {
    transport: Arc<dyn HttpTransport>,
}

impl ApiInvoker {
    /// Creates an invoker sending through `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AgentInvoker for ApiInvoker {
    async fn invoke(
        &self,
        spec: &AgentSpec,
        status: &RunStatus,
        _payload: &mut AgentPayload,
    ) -> Result<Invocation> {
        let endpoint = spec
            .agent_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| Error::Config("Agent API endpoint URL is required".to_owned()))?;

        status.phase(Phase::Invoking, "Calling agent web service...");
        let request = build_request(spec, endpoint)?;
        tracing::info!(
            endpoint,
            method = %request.method,
            auth = ?spec.auth_type,
            "Calling agent API"
        );

        let sent = Instant::now();
        let response = send_with_timeout(self.transport.as_ref(), request, spec.timeout).await?;
        let elapsed = sent.elapsed().as_millis() as u64;

        let parsed = from_str::<Value>(&response.body).ok();
        let content = extract_content(parsed.as_ref(), &response.body);
        let success = response.is_success();
        let status_line = format!("{} {}", response.status, response.status_text);

        let reply = AgentReply {
            content,
            status: if success { "success" } else { "error" }.to_owned(),
            status_code: Some(response.status),
            status_text: Some(response.status_text),
            execution_time: Some(elapsed),
            raw: Some(parsed.unwrap_or_else(|| json!({"content": response.body}))),
            trace: None,
        };
        let assertions = vec![AssertionResult::new(
            "HTTP Status",
            "status",
            success,
            "2xx Success",
            status_line,
        )];
        Ok(Invocation { reply, assertions })
    }
}

/// Builds the agent request: JSON content type, auth, rendered body.
fn build_request(spec: &AgentSpec, endpoint: &str) -> Result<HttpRequest> {
    let method: HttpMethod = spec.http_method.parse()?;
    let mut request =
        HttpRequest::new(method, endpoint).with_header("Content-Type", "application/json");

    if let Some(authorization) = authorization(spec) {
        request = request.with_header("Authorization", authorization);
    }

    if method.allows_body() {
        let template = spec
            .request_body_template
            .as_deref()
            .filter(|template| !template.is_empty())
            .unwrap_or(DEFAULT_BODY_TEMPLATE);
        request.body = Some(render_body(
            template,
            &spec.prompt,
            spec.conversation_history.as_ref(),
        ));
    }
    Ok(request)
}

fn authorization(spec: &AgentSpec) -> Option<String> {
    match spec.auth_type {
        AgentAuthType::Basic => {
            let username = non_empty(spec.auth_username.as_deref())?;
            let password = non_empty(spec.auth_password.as_deref())?;
            Some(auth::basic(username, password))
        }
        AgentAuthType::Bearer => non_empty(spec.agent_api_key.as_deref()).map(auth::bearer),
        AgentAuthType::Anonymous => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}

/// Substitutes `{{prompt}}`, `{{history}}` and `{{conversationHistory}}`.
///
/// The prompt is escaped for use inside a JSON string. History that is not
/// valid JSON becomes an empty list.
pub fn render_body(template: &str, prompt: &str, history: Option<&Value>) -> String {
    let history = serialized_history(history);
    template
        .replace("{{prompt}}", &json_escape(prompt))
        .replace("{{history}}", &history)
        .replace("{{conversationHistory}}", &history)
}

fn serialized_history(history: Option<&Value>) -> String {
    match history {
        None | Some(Value::Null) => EMPTY_HISTORY.to_owned(),
        Some(Value::String(text)) => from_str::<Value>(text)
            .map_or_else(|_| EMPTY_HISTORY.to_owned(), |value| value.to_string()),
        Some(other) => other.to_string(),
    }
}

fn json_escape(text: &str) -> String {
    let quoted = Value::String(text.to_owned()).to_string();
    quoted
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(&quoted)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_value;

    fn spec(value: Value) -> AgentSpec {
        from_value(value).unwrap()
    }

    #[test]
    fn test_default_template_produces_valid_json() {
        let body = render_body(DEFAULT_BODY_TEMPLATE, "Say \"hi\"\nplease", None);
        let parsed: Value = from_str(&body).unwrap();
        assert_eq!(parsed["prompt"], json!("Say \"hi\"\nplease"));
    }

    #[test]
    fn test_history_tokens() {
        let template = r#"{"q": "{{prompt}}", "h": {{history}}, "c": {{conversationHistory}}}"#;
        let body = render_body(template, "x", Some(&json!("[{\"role\": \"user\"}]")));
        let parsed: Value = from_str(&body).unwrap();
        assert_eq!(parsed["h"], json!([{"role": "user"}]));
        assert_eq!(parsed["c"], parsed["h"]);

        let broken = render_body(template, "x", Some(&json!("not json")));
        let fallback: Value = from_str(&broken).unwrap();
        assert_eq!(fallback["h"], json!([]));
    }

    #[test]
    fn test_authorization_modes() {
        let basic = spec(json!({
            "prompt": "p",
            "authUsername": "user",
            "authPassword": "pass"
        }));
        assert_eq!(authorization(&basic).as_deref(), Some("Basic dXNlcjpwYXNz"));

        let incomplete = spec(json!({"prompt": "p", "authUsername": "user"}));
        assert!(authorization(&incomplete).is_none());

        let bearer = spec(json!({"prompt": "p", "authType": "bearer", "agentApiKey": "Bearer k"}));
        assert_eq!(authorization(&bearer).as_deref(), Some("Bearer k"));

        let none = spec(json!({"prompt": "p", "authType": "none", "agentApiKey": "k"}));
        assert!(authorization(&none).is_none());
    }

    #[test]
    fn test_get_requests_carry_no_body() {
        let get = spec(json!({"prompt": "p", "httpMethod": "GET", "authType": "none"}));
        let request = build_request(&get, "https://agent.test").unwrap();
        assert!(request.body.is_none());
        assert_eq!(request.header("content-type"), Some("application/json"));
    }
}
