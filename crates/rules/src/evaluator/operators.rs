//! Leaf operator semantics and value coercion.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;

use recordhook_core::FieldMap;

use crate::schema::Operator;

pub(super) fn evaluate_leaf(
    field: &str,
    operator: Operator,
    value: Option<&Value>,
    fields: &FieldMap,
    previous: Option<&FieldMap>,
) -> bool {
    let Some(current) = fields.get(field) else {
        return false;
    };

    match operator {
        Operator::Equals => value.is_some_and(|v| values_equal(current, v)),
        Operator::NotEquals => value.is_some_and(|v| !values_equal(current, v)),
        Operator::GreaterThan => compare_numeric(current, value) == Some(Ordering::Greater),
        Operator::LessThan => compare_numeric(current, value) == Some(Ordering::Less),
        Operator::Contains => value.is_some_and(|v| contains(current, v)),
        Operator::IsEmpty => is_empty_value(current),
        Operator::IsNotEmpty => !is_empty_value(current),
        Operator::Changed => match previous {
            Some(prev) => field_changed(prev.get(field).unwrap_or(&Value::Null), current),
            None => false,
        },
    }
}

/// Numeric view of a value: JSON numbers and numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Literal stored representation used by string comparisons.
fn literal(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok().map(Cow::Owned),
    }
}

fn values_equal(stored: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(stored), as_number(expected)) {
        return a == b;
    }
    match (literal(stored), literal(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Numbers compare by value so `1` and `1.0` are the same state; anything
/// else, including a type change, compares structurally.
fn field_changed(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() != b.as_f64(),
        _ => old != new,
    }
}

fn compare_numeric(stored: &Value, expected: Option<&Value>) -> Option<Ordering> {
    let a = as_number(stored)?;
    let b = as_number(expected?)?;
    a.partial_cmp(&b)
}

fn contains(stored: &Value, needle: &Value) -> bool {
    if let Value::Array(items) = stored {
        return items.iter().any(|item| values_equal(item, needle));
    }
    match (literal(stored), literal(needle)) {
        (Some(haystack), Some(needle)) => haystack.contains(&*needle),
        _ => false,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
