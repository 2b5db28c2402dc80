//! HTTP endpoint handlers. These are thin wrappers that resolve the resource,
//! bind a provider to the caller's token and forward to the adapter or one
//! of the workflow modules.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::HeaderMap,
  Json,
};
use tracing::{debug, info, instrument};

use crate::dashboard::{self, DashboardStats};
use crate::domain::Resource;
use crate::error::{AdminError, AdminResult};
use crate::ordering;
use crate::pool::{self, HierarchyLevel};
use crate::protocol::*;
use crate::provider::DataProvider;
use crate::records::Record;
use crate::sessions::{self, SessionSaved};
use crate::state::AppState;
use crate::util::{bearer_token, id_value, trunc_for_log};

/// Provider acting as the caller. A missing token is only an error when the
/// server is configured to require one.
fn provider(state: &AppState, headers: &HeaderMap) -> AdminResult<DataProvider> {
  let token = bearer_token(headers);
  if token.is_none() && state.config.server.require_auth {
    return Err(AdminError::Unauthorized("Missing bearer token".into()));
  }
  Ok(state.provider(token))
}

fn list_params(state: &AppState, resource: Resource, q: &ListQuery) -> AdminResult<ListParams> {
  let pagination = Pagination::new(q.page.unwrap_or(1), state.config.per_page(q.per_page));
  let sort = Sort {
    field: q.sort.clone().unwrap_or_else(|| resource.id_field().to_string()),
    order: q.order.unwrap_or_default(),
  };
  let mut params = ListParams::new(pagination, sort);
  if let Some(raw) = q.filter.as_deref().filter(|s| !s.trim().is_empty()) {
    debug!(target: "provider", %resource, filter = %trunc_for_log(raw, 200), "list filter");
    params.filter = serde_json::from_str::<Record>(raw)
      .map_err(|e| AdminError::validation(resource.name(), format!("filter must be a JSON object: {e}")))?;
  }
  Ok(params)
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, backend: state.store.kind() })
}

#[instrument(level = "info", skip(state, headers, q), fields(%resource))]
pub async fn http_list(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Query(q): Query<ListQuery>,
) -> AdminResult<Json<ListResult>> {
  let resource = Resource::parse(&resource)?;
  let params = list_params(&state, resource, &q)?;
  let list = provider(&state, &headers)?.get_list(resource, &params).await?;
  info!(target: "provider", %resource, total = list.total, returned = list.data.len(), "HTTP list served");
  Ok(Json(list))
}

#[instrument(level = "info", skip(state, headers, q), fields(%resource, target = %q.target))]
pub async fn http_reference(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Query(q): Query<ReferenceQuery>,
) -> AdminResult<Json<ListResult>> {
  let resource = Resource::parse(&resource)?;
  let params = list_params(&state, resource, &q.list_query())?;
  let list = provider(&state, &headers)?
    .get_many_reference(resource, &q.target, &id_value(&q.id), &params)
    .await?;
  Ok(Json(list))
}

#[instrument(level = "info", skip(state, headers, body), fields(%resource, n = body.ids.len()))]
pub async fn http_get_many(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Json(body): Json<IdsIn>,
) -> AdminResult<Json<RecordsOut>> {
  let resource = Resource::parse(&resource)?;
  let data = provider(&state, &headers)?.get_many(resource, &body.ids).await?;
  Ok(Json(RecordsOut { data }))
}

#[instrument(level = "info", skip(state, headers), fields(%resource, %id))]
pub async fn http_get_one(
  State(state): State<Arc<AppState>>,
  Path((resource, id)): Path<(String, String)>,
  headers: HeaderMap,
) -> AdminResult<Json<RecordOut>> {
  let resource = Resource::parse(&resource)?;
  let data = provider(&state, &headers)?.get_one(resource, &id_value(&id)).await?;
  Ok(Json(RecordOut { data }))
}

#[instrument(level = "info", skip(state, headers, data), fields(%resource))]
pub async fn http_create(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Json(data): Json<Record>,
) -> AdminResult<Json<RecordOut>> {
  let resource = Resource::parse(&resource)?;
  let data = provider(&state, &headers)?.create(resource, data).await?;
  Ok(Json(RecordOut { data }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%resource, %id))]
pub async fn http_update(
  State(state): State<Arc<AppState>>,
  Path((resource, id)): Path<(String, String)>,
  headers: HeaderMap,
  Json(body): Json<UpdateIn>,
) -> AdminResult<Json<RecordOut>> {
  let resource = Resource::parse(&resource)?;
  let data = provider(&state, &headers)?
    .update(resource, &id_value(&id), body.data, body.previous_data.as_ref())
    .await?;
  Ok(Json(RecordOut { data }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%resource, n = body.ids.len()))]
pub async fn http_update_many(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Json(body): Json<UpdateManyIn>,
) -> AdminResult<Json<IdsOut>> {
  let resource = Resource::parse(&resource)?;
  let data = provider(&state, &headers)?.update_many(resource, &body.ids, body.data).await?;
  Ok(Json(IdsOut { data }))
}

#[instrument(level = "info", skip(state, headers, q), fields(%resource, %id))]
pub async fn http_delete(
  State(state): State<Arc<AppState>>,
  Path((resource, id)): Path<(String, String)>,
  headers: HeaderMap,
  Query(q): Query<DeleteQuery>,
) -> AdminResult<Json<RecordOut>> {
  let resource = Resource::parse(&resource)?;
  // The caller's view of the row; only the config table hint matters here.
  let previous = q.source_table.map(|t| {
    let mut r = Record::new();
    r.insert("source_table".into(), t.into());
    r
  });
  let data = provider(&state, &headers)?
    .delete(resource, &id_value(&id), previous.as_ref())
    .await?;
  Ok(Json(RecordOut { data }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%resource, n = body.ids.len()))]
pub async fn http_delete_many(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Json(body): Json<IdsIn>,
) -> AdminResult<Json<IdsOut>> {
  let resource = Resource::parse(&resource)?;
  let data = provider(&state, &headers)?.delete_many(resource, &body.ids).await?;
  Ok(Json(IdsOut { data }))
}

#[instrument(level = "info", skip(state, headers, q), fields(%resource))]
pub async fn http_get_ordering(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Query(q): Query<OrderingQuery>,
) -> AdminResult<Json<ItemsOut>> {
  let resource = Resource::parse(&resource)?;
  let parent = q.parent_id.as_deref().map(id_value);
  let data = ordering::load_items(&provider(&state, &headers)?, resource, parent).await?;
  Ok(Json(ItemsOut { data }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%resource, n = body.data.len()))]
pub async fn http_put_ordering(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Json(body): Json<OrderUpdateIn>,
) -> AdminResult<Json<CountOut>> {
  let resource = Resource::parse(&resource)?;
  if !resource.is_orderable() {
    return Err(AdminError::validation(resource.name(), "resource has no display order"));
  }
  let n = provider(&state, &headers)?.batch_update_order(resource, &body.data).await?;
  Ok(Json(CountOut { data: n as u64 }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%resource))]
pub async fn http_move(
  State(state): State<Arc<AppState>>,
  Path(resource): Path<String>,
  headers: HeaderMap,
  Json(body): Json<MoveIn>,
) -> AdminResult<Json<ItemsOut>> {
  let resource = Resource::parse(&resource)?;
  let data = ordering::reorder(
    &provider(&state, &headers)?,
    resource,
    body.parent_id,
    &body.active_id,
    &body.over_id,
  )
  .await?;
  Ok(Json(ItemsOut { data }))
}

#[instrument(level = "info", skip(state, headers, body), fields(required = body.required_questions))]
pub async fn http_pool_count(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<PoolCountIn>,
) -> AdminResult<Json<PoolPreviewOut>> {
  let preview = pool::preview(&provider(&state, &headers)?, &body.criteria, body.required_questions).await?;
  Ok(Json(preview.into()))
}

#[instrument(level = "info", skip(state, headers, body), fields(edits = body.edits.len()))]
pub async fn http_pool_resolve(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<PoolResolveIn>,
) -> AdminResult<Json<PoolResolveOut>> {
  let (criteria, preview) =
    pool::resolve(&provider(&state, &headers)?, body.criteria, body.edits, body.required_questions).await?;
  let level = criteria.level();
  Ok(Json(PoolResolveOut {
    difficulty: criteria.difficulty_bounds(),
    parent_level: level.parent(),
    level,
    criteria,
    preview: preview.into(),
  }))
}

#[instrument(level = "info", skip(state, headers), fields(level = %q.level))]
pub async fn http_pool_choices(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Query(q): Query<ChoicesQuery>,
) -> AdminResult<Json<ChoicesOut>> {
  let level = HierarchyLevel::parse(&q.level)
    .ok_or_else(|| AdminError::validation("pool", format!("unknown hierarchy level {}", q.level)))?;
  let data = pool::choices(&provider(&state, &headers)?, level, q.parent_id.as_deref()).await?;
  Ok(Json(ChoicesOut { data }))
}

#[instrument(level = "info", skip(state, headers, body))]
pub async fn http_create_session(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<SessionIn>,
) -> AdminResult<Json<SessionSaved>> {
  let saved = sessions::save_session(&provider(&state, &headers)?, None, body.data, body.criteria).await?;
  Ok(Json(saved))
}

#[instrument(level = "info", skip(state, headers, body), fields(%id))]
pub async fn http_update_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  headers: HeaderMap,
  Json(body): Json<SessionIn>,
) -> AdminResult<Json<SessionSaved>> {
  let id = id_value(&id);
  let saved = sessions::save_session(&provider(&state, &headers)?, Some(&id), body.data, body.criteria).await?;
  Ok(Json(saved))
}

#[instrument(level = "info", skip(state, headers), fields(%id))]
pub async fn http_populate_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  headers: HeaderMap,
) -> AdminResult<Json<CountOut>> {
  let data = sessions::repopulate(&provider(&state, &headers)?, &id_value(&id)).await?;
  Ok(Json(CountOut { data }))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_dashboard(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> AdminResult<Json<DashboardStats>> {
  let stats = dashboard::stats(&provider(&state, &headers)?, &state.config.dashboard).await?;
  Ok(Json(stats))
}
