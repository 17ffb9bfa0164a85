use crate::value::Value;
use std::cmp::Ordering;

/// Natural ordering for record ids.
///
/// Ids issued by the id sequence are decimal integers and compare
/// numerically; any other id sorts after them, lexicographically. Equal
/// numbers with different spellings (`"01"`, `"1"`) fall back to text order
/// so the ordering stays total.
#[must_use]
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Natural ordering between two decoded attribute values.
///
/// Null sorts first. Same-kind values use their kind's ordering
/// (lexicographic text, numeric numbers and instants, `false < true`);
/// integers and floats compare numerically with each other. Anything else
/// falls back to a fixed variant rank.
#[must_use]
pub fn natural_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,

        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Id(a), Value::Id(b)) => compare_ids(a, b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
        (Value::Int(a), Value::Float(b)) => widen(*a).total_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.total_cmp(&widen(*b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),

        _ => rank(a).cmp(&rank(b)),
    }
}

#[expect(clippy::cast_precision_loss)]
fn widen(value: i64) -> f64 {
    value as f64
}

const fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Timestamp(_) => 3,
        Value::Id(_) => 4,
        Value::Text(_) => 5,
        Value::List(_) => 6,
        Value::Set(_) => 7,
        Value::Hash(_) => 8,
        Value::SortedSet(_) => 9,
    }
}
