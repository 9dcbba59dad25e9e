//! Declarative assertions and the stateless evaluator behind them.
//!
//! Evaluation never fails: a locator that resolves to nothing yields
//! [`Actual::Undefined`], which fails every operator except `isNull`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::extract::is_truthy;
use crate::spec::render;
use crate::types::AssertionResult;

/// Placeholder rendered when a locator resolved to nothing.
const UNDEFINED: &str = "(undefined)";
/// Placeholder rendered when an assertion carries no expected value.
const EXISTS: &str = "(exists)";
/// Tolerance for loose numeric equality.
const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Where an assertion reads its actual value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LocatorKind {
    /// Dotted/bracketed path into the JSON body.
    JsonPath,
    /// Response header, matched case-insensitively.
    Header,
    /// Synthetic response time in milliseconds.
    ResponseTime,
    /// Unrecognized locator; always resolves to undefined.
    Unknown(String),
}

impl LocatorKind {
    /// Name as used in the assertion DSL.
    pub fn as_str(&self) -> &str {
        match self {
            Self::JsonPath => "jsonPath",
            Self::Header => "header",
            Self::ResponseTime => "responseTime",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for LocatorKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "jsonPath" => Self::JsonPath,
            "header" => Self::Header,
            "responseTime" => Self::ResponseTime,
            _ => Self::Unknown(value),
        }
    }
}

impl From<LocatorKind> for String {
    fn from(value: LocatorKind) -> Self {
        value.as_str().to_owned()
    }
}

/// Comparison applied between the actual and expected values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    /// Loose equality.
    Equals,
    /// Negated loose equality.
    NotEquals,
    /// Substring test on the stringified actual value.
    Contains,
    /// Actual is present and not null.
    Exists,
    /// Actual is null or absent.
    IsNull,
    /// Numeric greater-than.
    GreaterThan,
    /// Numeric less-than.
    LessThan,
    /// Regex match on the stringified actual value.
    Matches,
    /// Unrecognized operator; always fails.
    Unknown(String),
}

impl Operator {
    /// Name as used in the assertion DSL.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::Contains => "contains",
            Self::Exists => "exists",
            Self::IsNull => "isNull",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::Matches => "matches",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "equals" => Self::Equals,
            "notEquals" => Self::NotEquals,
            "contains" => Self::Contains,
            "exists" => Self::Exists,
            "isNull" => Self::IsNull,
            "greaterThan" => Self::GreaterThan,
            "lessThan" => Self::LessThan,
            "matches" => Self::Matches,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_str().to_owned()
    }
}

/// A declarative check against a captured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Locator kind.
    #[serde(rename = "type")]
    pub locator: LocatorKind,
    /// Path or header name.
    #[serde(default)]
    pub path: Option<String>,
    /// Comparison operator.
    pub operator: Operator,
    /// Expected value, absent for `exists`/`isNull`.
    #[serde(default)]
    pub expected: Option<Value>,
}

impl Assertion {
    /// Human-readable name, e.g. `jsonPath: $.id equals 7`.
    pub fn display_name(&self) -> String {
        let expected = self
            .expected
            .as_ref()
            .filter(|value| is_truthy(value))
            .map(render)
            .unwrap_or_default();
        format!(
            "{}: {} {} {}",
            self.locator.as_str(),
            self.path.as_deref().unwrap_or_default(),
            self.operator.as_str(),
            expected
        )
        .trim()
        .to_owned()
    }
}

/// The response an assertion is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CapturedResponse<'resp> {
    /// Decoded body.
    pub body: &'resp Value,
    /// Headers keyed by lower-cased name.
    pub headers: &'resp BTreeMap<String, String>,
    /// Response time in milliseconds.
    pub response_time: u64,
}

/// Value a locator resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Actual {
    /// Nothing was found at the locator.
    Undefined,
    /// A value was found (possibly JSON null).
    Value(Value),
}

impl Actual {
    /// Converts into the value recorded in an [`AssertionResult`].
    pub fn into_value(self) -> Value {
        match self {
            Self::Undefined => Value::from(UNDEFINED),
            Self::Value(value) => value,
        }
    }
}

/// Evaluates one assertion. Never fails.
pub fn evaluate(assertion: &Assertion, captured: &CapturedResponse<'_>) -> AssertionResult {
    let actual = resolve(assertion, captured);
    let passed = compare(&assertion.operator, &actual, assertion.expected.as_ref());
    let expected = assertion
        .expected
        .clone()
        .filter(|value| !value.is_null())
        .unwrap_or_else(|| Value::from(EXISTS));

    AssertionResult::new(
        assertion.display_name(),
        assertion.locator.as_str(),
        passed,
        expected,
        actual.into_value(),
    )
}

/// Resolves a dotted/bracketed path such as `$.items[0].id`.
pub fn json_path<'val>(root: &'val Value, path: &str) -> Option<&'val Value> {
    if path.is_empty() || !is_truthy(root) {
        return None;
    }
    let trimmed = path
        .strip_prefix('$')
        .map_or(path, |rest| rest.strip_prefix('.').unwrap_or(rest));

    let mut current = root;
    for part in trimmed.split(['.', '[', ']']).filter(|part| !part.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Compares an integer against a directive such as `>=10`, `<5`, `=3` or `7`.
pub fn evaluate_numeric(actual: i64, directive: &str) -> bool {
    let directive = directive.trim();
    let (comparator, operand) = [">=", "<=", ">", "<", "="]
        .into_iter()
        .find_map(|prefix| directive.strip_prefix(prefix).map(|rest| (prefix, rest)))
        .unwrap_or(("", directive));

    let Some(target) = parse_int_prefix(operand) else {
        return false;
    };
    match comparator {
        ">=" => actual >= target,
        "<=" => actual <= target,
        ">" => actual > target,
        "<" => actual < target,
        _ => actual == target,
    }
}

/// Parses the leading integer of `text`, ignoring trailing garbage.
fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['-', '+']));
    let digits_len = text[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    text[..digits_start + digits_len].parse().ok()
}

fn resolve(assertion: &Assertion, captured: &CapturedResponse<'_>) -> Actual {
    let path = assertion.path.as_deref().unwrap_or_default();
    let found = match &assertion.locator {
        LocatorKind::JsonPath => json_path(captured.body, path).cloned(),
        LocatorKind::Header => captured
            .headers
            .get(&path.to_lowercase())
            .map(|value| Value::from(value.as_str())),
        LocatorKind::ResponseTime => Some(Value::from(captured.response_time)),
        LocatorKind::Unknown(_) => None,
    };
    found.map_or(Actual::Undefined, Actual::Value)
}

fn compare(operator: &Operator, actual: &Actual, expected: Option<&Value>) -> bool {
    let Actual::Value(value) = actual else {
        return *operator == Operator::IsNull;
    };

    match operator {
        Operator::Equals => loose_eq(value, expected),
        Operator::NotEquals => !loose_eq(value, expected),
        Operator::Contains => {
            expected.is_some_and(|needle| render(value).contains(render(needle).as_str()))
        }
        Operator::Exists => !value.is_null(),
        Operator::IsNull => value.is_null(),
        Operator::GreaterThan => numeric_pair(value, expected).is_some_and(|(lhs, rhs)| lhs > rhs),
        Operator::LessThan => numeric_pair(value, expected).is_some_and(|(lhs, rhs)| lhs < rhs),
        Operator::Matches => expected
            .and_then(|pattern| Regex::new(&render(pattern)).ok())
            .is_some_and(|regex| regex.is_match(&render(value))),
        Operator::Unknown(_) => false,
    }
}

fn numeric_pair(actual: &Value, expected: Option<&Value>) -> Option<(f64, f64)> {
    let lhs = as_number(actual)?;
    let rhs = as_number(expected?)?;
    (!lhs.is_nan() && !rhs.is_nan()).then_some((lhs, rhs))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn numbers_equal(lhs: Option<f64>, rhs: Option<f64>) -> bool {
    matches!((lhs, rhs), (Some(left), Some(right)) if (left - right).abs() < NUMERIC_TOLERANCE)
}

/// Equality after coercing numbers and booleans the way a form field would.
fn loose_eq(actual: &Value, expected: Option<&Value>) -> bool {
    let Some(expected) = expected else {
        return actual.is_null();
    };
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(lhs), Value::Number(rhs)) => numbers_equal(lhs.as_f64(), rhs.as_f64()),
        (Value::Number(number), Value::String(text))
        | (Value::String(text), Value::Number(number)) => {
            numbers_equal(number.as_f64(), text.trim().parse().ok())
        }
        (Value::Bool(flag), Value::String(text)) | (Value::String(text), Value::Bool(flag)) => {
            text.trim() == flag.to_string()
        }
        (Value::Bool(flag), Value::Number(number)) | (Value::Number(number), Value::Bool(flag)) => {
            numbers_equal(number.as_f64(), Some(if *flag { 1.0 } else { 0.0 }))
        }
        _ => render(actual) == render(expected),
    }
}
