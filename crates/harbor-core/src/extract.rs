//! Ordered extraction strategies for loosely shaped JSON.
//!
//! Agents and consumer endpoints answer in many shapes. Each strategy list is
//! tried in order and the first hit wins.

use serde_json::Value;

/// Fields probed, in order, for an agent's textual answer.
const CONTENT_FIELDS: [&str; 7] = [
    "content", "response", "message", "result", "output", "text", "answer",
];

/// JavaScript-style truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0 && !float.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// One way of pulling agent text out of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStrategy {
    /// A named top-level field with a truthy value.
    Field(&'static str),
    /// The body itself is a JSON string.
    BareString,
    /// The raw body text.
    RawBody,
}

impl ContentStrategy {
    /// Strategies in probe order.
    pub fn ordered() -> Vec<Self> {
        CONTENT_FIELDS
            .into_iter()
            .map(Self::Field)
            .chain([Self::BareString, Self::RawBody])
            .collect()
    }

    fn apply(self, parsed: Option<&Value>, raw: &str) -> Option<String> {
        match self {
            Self::Field(name) => parsed
                .and_then(|body| body.get(name))
                .filter(|value| is_truthy(value))
                .map(text_of),
            Self::BareString => parsed.and_then(Value::as_str).map(str::to_owned),
            Self::RawBody => Some(raw.to_owned()),
        }
    }
}

/// Extracts agent text from a response, falling back to the raw body.
pub fn extract_content(parsed: Option<&Value>, raw: &str) -> String {
    ContentStrategy::ordered()
        .into_iter()
        .find_map(|strategy| strategy.apply(parsed, raw))
        .unwrap_or_default()
}

/// One way of locating the message collection in a consumer response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStrategy {
    /// The body is an array.
    BareArray,
    /// A named field holding an array.
    Field(&'static str),
    /// The body itself is a single message.
    Singleton,
}

impl CollectionStrategy {
    /// Strategies in probe order.
    pub const ORDERED: [Self; 4] = [
        Self::BareArray,
        Self::Field("messages"),
        Self::Field("result"),
        Self::Singleton,
    ];

    fn apply(self, body: &Value) -> Option<Vec<&Value>> {
        match self {
            Self::BareArray => body.as_array().map(|items| items.iter().collect()),
            Self::Field(name) => body
                .get(name)
                .and_then(Value::as_array)
                .map(|items| items.iter().collect()),
            Self::Singleton => is_truthy(body).then(|| vec![body]),
        }
    }
}

/// Locates the messages in a consumer response.
pub fn locate_messages(body: &Value) -> Vec<&Value> {
    CollectionStrategy::ORDERED
        .into_iter()
        .find_map(|strategy| strategy.apply(body))
        .unwrap_or_default()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
