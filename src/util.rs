//! Small utility helpers used across modules.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde_json::Value;

/// Ids travel as text (paths, selector values). Integer-looking ids become
/// numbers so they compare equal to integer primary keys; anything else
/// (uuids, config keys) stays text. Only canonical integers convert, so a
/// key like "007" keeps its leading zeros.
pub fn id_value(raw: &str) -> Value {
  match raw.parse::<i64>() {
    Ok(n) if n.to_string() == raw => Value::from(n),
    _ => Value::String(raw.to_string()),
  }
}

/// The token from `Authorization: Bearer <token>`, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = value.split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge filter payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
