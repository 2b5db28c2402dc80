//! Helpers for working with rows as JSON objects: comparison, pattern matching,
//! sorting and range slicing. Shared by the in-memory store and the
//! configuration union, which both filter and paginate rows locally.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::protocol::SortOrder;

/// A single row, as returned by the backend.
pub type Record = Map<String, Value>;

/// Equality that tolerates the string/number mix produced by query strings
/// (`"3"` equals `3`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
    (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
      s.trim().parse::<f64>().ok() == n.as_f64()
    }
    _ => a == b,
  }
}

fn rank(v: &Value) -> u8 {
  match v {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::String(_) => 3,
    Value::Array(_) => 4,
    Value::Object(_) => 5,
  }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
  match (a, b) {
    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
    (Value::Number(x), Value::Number(y)) => {
      let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
      x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
    (Value::String(x), Value::String(y)) => x.cmp(y),
    (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
      a.to_string().cmp(&b.to_string())
    }
    _ => rank(a).cmp(&rank(b)),
  }
}

/// SQL `ILIKE` semantics: case-insensitive, `%` matches any run of characters,
/// `_` matches exactly one.
pub fn ilike(value: &str, pattern: &str) -> bool {
  let v: Vec<char> = value.to_lowercase().chars().collect();
  let p: Vec<char> = pattern.to_lowercase().chars().collect();
  // Classic two-pointer wildcard match with backtracking on the last '%'.
  let (mut vi, mut pi) = (0usize, 0usize);
  let mut star: Option<(usize, usize)> = None;
  while vi < v.len() {
    if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == v[vi])) {
      vi += 1;
      pi += 1;
    } else if pi < p.len() && p[pi] == '%' {
      star = Some((pi, vi));
      pi += 1;
    } else if let Some((sp, sv)) = star {
      pi = sp + 1;
      vi = sv + 1;
      star = Some((sp, sv + 1));
    } else {
      return false;
    }
  }
  p[pi..].iter().all(|c| *c == '%')
}

/// Case-insensitive substring test on an optional string field.
pub fn field_contains(record: &Record, field: &str, needle_lower: &str) -> bool {
  record
    .get(field)
    .and_then(Value::as_str)
    .map(|s| s.to_lowercase().contains(needle_lower))
    .unwrap_or(false)
}

/// Stable sort by one field; rows missing the field sort as null.
pub fn sort_records(records: &mut [Record], field: &str, order: SortOrder) {
  records.sort_by(|a, b| {
    let ord = compare_values(
      a.get(field).unwrap_or(&Value::Null),
      b.get(field).unwrap_or(&Value::Null),
    );
    match order {
      SortOrder::Asc => ord,
      SortOrder::Desc => ord.reverse(),
    }
  });
}

/// Keep rows `start..=end` (inclusive, like an HTTP `Range` header).
pub fn slice_range(records: Vec<Record>, start: u64, end: u64) -> Vec<Record> {
  if end < start {
    return Vec::new();
  }
  let skip = usize::try_from(start).unwrap_or(usize::MAX);
  let take = usize::try_from(end - start).map_or(usize::MAX, |n| n.saturating_add(1));
  records.into_iter().skip(skip).take(take).collect()
}

/// Render an id for messages and text filters.
pub fn id_string(v: &Value) -> String {
  match v {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
