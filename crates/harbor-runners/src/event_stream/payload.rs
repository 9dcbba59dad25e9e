//! Message preparation and wire encoding for event stream publishes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, from_str, json};
use std::collections::BTreeMap;
use uuid::Uuid;

use harbor_client::HttpRequest;
use harbor_core::spec::render;
use harbor_core::{MessageFormat, RequestDetails};

/// Header prefix for message properties in the single-message format.
const PROPERTY_HEADER_PREFIX: &str = "x-msg-props-";
const PREVIEW_CHARS: usize = 500;

/// Replaces `{{uuid}}`, `{{now}}` and `{{timestamp}}`.
///
/// Every `{{uuid}}` in one template receives the same id.
pub fn expand_template(template: &str, now: DateTime<Utc>) -> String {
    template
        .replace("{{uuid}}", &Uuid::new_v4().to_string())
        .replace("{{now}}", &now.to_rfc3339())
        .replace("{{timestamp}}", &now.timestamp_millis().to_string())
}

/// Expands a string payload and parses it as JSON when possible.
///
/// Non-string payloads are used as given; a missing payload is `null`.
pub fn prepare_payload(payload: Option<&Value>) -> Value {
    match payload {
        Some(Value::String(template)) => {
            let expanded = expand_template(template, Utc::now());
            from_str(&expanded).unwrap_or(Value::String(expanded))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

/// Body and headers for one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    /// Headers besides authorization.
    pub headers: BTreeMap<String, String>,
    /// Serialized body.
    pub body: String,
}

impl EncodedMessage {
    /// Moves the encoding onto a request.
    pub fn apply(self, mut request: HttpRequest) -> HttpRequest {
        request.headers.extend(self.headers);
        request.body = Some(self.body);
        request
    }
}

/// Encodes `message` in the requested wire format.
///
/// `single` sends the payload as the body and each property as an
/// `x-msg-props-*` header; `multiple` wraps it in a `messages` envelope
/// with the partition key folded into the properties.
pub fn encode(
    message: &Value,
    format: MessageFormat,
    properties: &Map<String, Value>,
    partition_key: Option<&str>,
) -> EncodedMessage {
    let partition_key = partition_key.filter(|key| !key.is_empty());
    let mut headers = BTreeMap::new();

    match format {
        MessageFormat::Single => {
            let content_type = if is_structured(message) {
                "application/json"
            } else {
                "text/plain"
            };
            headers.insert("Content-Type".to_owned(), content_type.to_owned());
            for (key, value) in properties {
                headers.insert(format!("{PROPERTY_HEADER_PREFIX}{key}"), render(value));
            }
            if let Some(key) = partition_key {
                headers.insert(format!("{PROPERTY_HEADER_PREFIX}partitionKey"), key.to_owned());
            }
            EncodedMessage {
                headers,
                body: render(message),
            }
        }
        MessageFormat::Multiple => {
            headers.insert("Content-Type".to_owned(), "application/json".to_owned());
            let mut all_properties = properties.clone();
            if let Some(key) = partition_key {
                all_properties.insert("partitionKey".to_owned(), Value::String(key.to_owned()));
            }

            let mut entry = Map::new();
            entry.insert("payload".to_owned(), Value::String(render(message)));
            if !all_properties.is_empty() {
                entry.insert("properties".to_owned(), Value::Object(all_properties));
            }
            EncodedMessage {
                headers,
                body: json!({"messages": [entry]}).to_string(),
            }
        }
    }
}

/// Summarizes what is about to be sent, leaving out the authorization header.
pub fn request_details(request: &HttpRequest, format: MessageFormat) -> RequestDetails {
    let body = request.body.as_deref().unwrap_or_default();
    RequestDetails {
        url: request.url.clone(),
        format: format.as_str().to_owned(),
        headers: request
            .headers
            .keys()
            .filter(|name| !name.eq_ignore_ascii_case("authorization"))
            .cloned()
            .collect(),
        body_preview: preview(body, PREVIEW_CHARS),
    }
}

/// First `limit` characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// First `limit` characters of `text`.
pub fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn is_structured(message: &Value) -> bool {
    matches!(message, Value::Object(_) | Value::Array(_) | Value::Null)
}
