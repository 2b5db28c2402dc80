//! Client for the hosted backend's PostgREST surface (`/rest/v1`).
//!
//! Filters are rendered as query parameters (`col=eq.v`, `or=(…)`), pagination
//! uses the `Range` header and totals come back in `Content-Range`.
//! Calls are instrumented with table names and row counts (never row contents).
//!
//! NOTE: We never log the API key or the caller's token.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{Condition, Rows, Select, TableStore};
use crate::error::StoreError;
use crate::protocol::SortOrder;
use crate::records::Record;

#[derive(Clone)]
pub struct PostgrestStore {
  pub client: reqwest::Client,
  /// Project URL, e.g. `https://xyz.supabase.co`.
  pub base_url: String,
  pub api_key: String,
  bearer: Option<String>,
}

impl std::fmt::Debug for PostgrestStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PostgrestStore")
      .field("base_url", &self.base_url)
      .field("authorized", &self.bearer.is_some())
      .finish()
  }
}

impl PostgrestStore {
  pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, StoreError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| StoreError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key: api_key.to_string(),
      bearer: None,
    })
  }

  fn table_url(&self, table: &str) -> String {
    format!("{}/rest/v1/{}", self.base_url, table)
  }

  fn request(&self, method: Method, url: &str) -> RequestBuilder {
    let token = self.bearer.as_deref().unwrap_or(&self.api_key);
    self.client.request(method, url)
      .header(USER_AGENT, "polilingo-admin-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("apikey", &self.api_key)
      .header(AUTHORIZATION, format!("Bearer {}", token))
  }

  async fn send(req: RequestBuilder) -> Result<Response, StoreError> {
    let res = req.send().await.map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = res.status();
    if status.is_success() {
      return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = extract_backend_error(&body).unwrap_or(body);
    if status.as_u16() == 401 || status.as_u16() == 403 {
      return Err(StoreError::Unauthorized { status: status.as_u16(), message });
    }
    Err(StoreError::Http { status: status.as_u16(), message })
  }

  async fn rows(res: Response) -> Result<Vec<Record>, StoreError> {
    res.json::<Vec<Record>>().await.map_err(|e| StoreError::Decode(e.to_string()))
  }
}

#[async_trait]
impl TableStore for PostgrestStore {
  fn kind(&self) -> &'static str {
    "postgrest"
  }

  #[instrument(level = "debug", skip(self, query), fields(%table))]
  async fn select(&self, table: &str, query: &Select) -> Result<Rows, StoreError> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(query.conditions.iter().map(render_condition));
    if let Some((field, order)) = &query.order {
      params.push(("order".into(), render_order(field, *order)));
    }

    let mut req = self.request(Method::GET, &self.table_url(table)).query(&params);
    if let Some((start, end)) = query.range {
      req = req.header("Range-Unit", "items").header("Range", format!("{}-{}", start, end));
    }
    if query.count {
      req = req.header("Prefer", "count=exact");
    }

    let res = Self::send(req).await?;
    let count = res
      .headers()
      .get("content-range")
      .and_then(|v| v.to_str().ok())
      .and_then(parse_content_range);
    let data = Self::rows(res).await?;
    debug!(target: "provider", %table, rows = data.len(), total = ?count, "select");
    Ok(Rows { data, count: if query.count { count } else { None } })
  }

  #[instrument(level = "debug", skip(self, row), fields(%table))]
  async fn insert(&self, table: &str, row: Record) -> Result<Vec<Record>, StoreError> {
    let req = self.request(Method::POST, &self.table_url(table))
      .header("Prefer", "return=representation")
      .json(&row);
    Self::rows(Self::send(req).await?).await
  }

  #[instrument(level = "debug", skip(self, conditions, patch), fields(%table))]
  async fn update(
    &self,
    table: &str,
    conditions: &[Condition],
    patch: Record,
  ) -> Result<Vec<Record>, StoreError> {
    let params: Vec<(String, String)> = conditions.iter().map(render_condition).collect();
    let req = self.request(Method::PATCH, &self.table_url(table))
      .query(&params)
      .header("Prefer", "return=representation")
      .json(&patch);
    Self::rows(Self::send(req).await?).await
  }

  #[instrument(level = "debug", skip(self, conditions), fields(%table))]
  async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Record>, StoreError> {
    let params: Vec<(String, String)> = conditions.iter().map(render_condition).collect();
    let req = self.request(Method::DELETE, &self.table_url(table))
      .query(&params)
      .header("Prefer", "return=representation");
    Self::rows(Self::send(req).await?).await
  }

  #[instrument(level = "info", skip(self, args), fields(%function))]
  async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
    let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
    let req = self.request(Method::POST, &url).json(&args);
    let res = Self::send(req).await?;
    res.json::<Value>().await.map_err(|e| StoreError::Decode(e.to_string()))
  }

  fn authorized(&self, bearer: Option<&str>) -> Arc<dyn TableStore> {
    let mut scoped = self.clone();
    if let Some(token) = bearer {
      scoped.bearer = Some(token.to_string());
    }
    Arc::new(scoped)
  }
}

/// Render one condition as a top-level query parameter.
fn render_condition(cond: &Condition) -> (String, String) {
  match cond {
    Condition::Eq(field, Value::Null) => (field.clone(), "is.null".into()),
    Condition::Eq(field, v) => (field.clone(), format!("eq.{}", scalar(v))),
    Condition::ILike(field, pattern) => (field.clone(), format!("ilike.{}", pattern.replace('%', "*"))),
    Condition::In(field, values) => (field.clone(), format!("in.({})", list(values))),
    Condition::AnyOf(inner) => ("or".into(), format!("({})", inner.iter().map(render_nested).collect::<Vec<_>>().join(","))),
  }
}

/// Render a condition inside an `or=(…)` group, where each term is `field.op.value`.
fn render_nested(cond: &Condition) -> String {
  match cond {
    Condition::Eq(field, Value::Null) => format!("{}.is.null", field),
    Condition::Eq(field, v) => format!("{}.eq.{}", field, quoted(&scalar(v))),
    Condition::ILike(field, pattern) => format!("{}.ilike.{}", field, quoted(&pattern.replace('%', "*"))),
    Condition::In(field, values) => format!("{}.in.({})", field, list(values)),
    Condition::AnyOf(inner) => format!("or({})", inner.iter().map(render_nested).collect::<Vec<_>>().join(",")),
  }
}

fn render_order(field: &str, order: SortOrder) -> String {
  match order {
    SortOrder::Asc => format!("{}.asc", field),
    SortOrder::Desc => format!("{}.desc", field),
  }
}

fn scalar(v: &Value) -> String {
  match v {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Values containing PostgREST delimiters must be double-quoted.
fn quoted(s: &str) -> String {
  if s.contains([',', '(', ')', '"', '\\']) {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
  } else {
    s.to_string()
  }
}

fn list(values: &[Value]) -> String {
  values.iter().map(|v| quoted(&scalar(v))).collect::<Vec<_>>().join(",")
}

/// `0-24/57` or `*/0` -> total row count.
pub fn parse_content_range(header: &str) -> Option<u64> {
  let (_, total) = header.split_once('/')?;
  total.trim().parse().ok()
}

/// Best-effort extraction of a backend error message from a JSON body.
fn extract_backend_error(body: &str) -> Option<String> {
  let v: Value = serde_json::from_str(body).ok()?;
  let message = v.get("message").and_then(|m| m.as_str())?;
  match v.get("hint").and_then(|h| h.as_str()) {
    Some(hint) if !hint.is_empty() => Some(format!("{} ({})", message, hint)),
    _ => Some(message.to_string()),
  }
}
