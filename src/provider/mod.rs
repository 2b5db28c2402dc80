//! Data-access adapter: the generic list/get/create/update/delete contract the
//! dashboard speaks, translated into table queries on a `TableStore`.
//!
//! Results are normalized to `{ data, total }` for lists and plain records
//! otherwise. Every backend failure is wrapped with the resource name, and a
//! single-row operation that touches zero rows is reported with a hint about
//! row-level security, since that is by far the usual cause.
//!
//! The configuration resource is special-cased in `config_union`.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::backend::{Condition, Select, TableStore, POPULATE_POOL_FN, QUESTION_COUNT_FN};
use crate::domain::{Resource, WriteMode};
use crate::error::{Action, AdminError, AdminResult, StoreError};
use crate::pool::PoolSelectionCriteria;
use crate::protocol::{ListParams, ListResult, OrderUpdate};
use crate::records::{id_string, Record};

mod config_union;

/// Filter keys matched with `ilike %value%` instead of equality.
const TEXT_FILTERS: [&str; 3] = ["name", "text", "description"];

#[derive(Clone)]
pub struct DataProvider {
    store: Arc<dyn TableStore>,
}

impl DataProvider {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    #[instrument(level = "info", skip(self, params), fields(%resource, page = params.pagination.page, per_page = params.pagination.per_page))]
    pub async fn get_list(&self, resource: Resource, params: &ListParams) -> AdminResult<ListResult> {
        if resource.is_config_union() {
            return config_union::get_list(self, params).await;
        }
        let (start, end) = params.pagination.range();
        let mut query = Select::all()
            .order_by(&params.sort.field, params.sort.order)
            .range(start, end)
            .with_count();
        query.conditions = filter_conditions(&params.filter);

        let rows = self
            .store
            .select(resource.table(), &query)
            .await
            .map_err(|e| AdminError::from_store(Action::List, resource.name(), e))?;
        Ok(ListResult { total: rows.count.unwrap_or(0), data: rows.data })
    }

    #[instrument(level = "info", skip(self), fields(%resource))]
    pub async fn get_one(&self, resource: Resource, id: &Value) -> AdminResult<Record> {
        if resource.is_config_union() {
            return config_union::get_one(self, &id_string(id)).await;
        }
        let query = Select::all().filter(Condition::eq("id", id.clone()));
        let rows = self
            .store
            .select(resource.table(), &query)
            .await
            .map_err(|e| AdminError::from_store(Action::Get, resource.name(), e))?;
        rows.data.into_iter().next().ok_or_else(|| AdminError::NoRows {
            action: Action::Get,
            resource: resource.name().to_string(),
            id: Some(id_string(id)),
        })
    }

    #[instrument(level = "info", skip(self, ids), fields(%resource, n = ids.len()))]
    pub async fn get_many(&self, resource: Resource, ids: &[Value]) -> AdminResult<Vec<Record>> {
        if resource.is_config_union() {
            return config_union::get_many(self, ids).await;
        }
        let query = Select::all().filter(Condition::is_in("id", ids.to_vec()));
        let rows = self
            .store
            .select(resource.table(), &query)
            .await
            .map_err(|e| AdminError::from_store(Action::List, resource.name(), e))?;
        Ok(rows.data)
    }

    /// Rows whose `target` column points at `id`, sorted and paginated.
    #[instrument(level = "info", skip(self, params), fields(%resource, %target))]
    pub async fn get_many_reference(
        &self,
        resource: Resource,
        target: &str,
        id: &Value,
        params: &ListParams,
    ) -> AdminResult<ListResult> {
        let mut params = params.clone();
        params.filter = Record::new();
        if resource.is_config_union() {
            params.filter.insert(target.to_string(), id.clone());
            return config_union::get_list(self, &params).await;
        }
        let (start, end) = params.pagination.range();
        let query = Select::all()
            .filter(Condition::eq(target, id.clone()))
            .order_by(&params.sort.field, params.sort.order)
            .range(start, end)
            .with_count();
        let rows = self
            .store
            .select(resource.table(), &query)
            .await
            .map_err(|e| AdminError::from_store(Action::List, resource.name(), e))?;
        Ok(ListResult { total: rows.count.unwrap_or(0), data: rows.data })
    }

    #[instrument(level = "info", skip(self, data), fields(%resource))]
    pub async fn create(&self, resource: Resource, data: Record) -> AdminResult<Record> {
        resource.validate(&data, WriteMode::Create)?;
        if resource.is_config_union() {
            return config_union::create(self, data).await;
        }
        let rows = self
            .store
            .insert(resource.table(), data)
            .await
            .map_err(|e| AdminError::from_store(Action::Create, resource.name(), e))?;
        let created = single(rows, Action::Create, resource.name(), None)?;
        info!(target: "provider", %resource, id = %created.get("id").map(id_string).unwrap_or_default(), "created");
        Ok(created)
    }

    #[instrument(level = "info", skip(self, data, previous), fields(%resource))]
    pub async fn update(
        &self,
        resource: Resource,
        id: &Value,
        data: Record,
        previous: Option<&Record>,
    ) -> AdminResult<Record> {
        resource.validate(&data, WriteMode::Update)?;
        if resource.is_config_union() {
            return config_union::update(self, &id_string(id), data, previous).await;
        }
        let rows = self
            .store
            .update(resource.table(), &[Condition::eq("id", id.clone())], data)
            .await
            .map_err(|e| AdminError::from_store(Action::Update, resource.name(), e))?;
        single(rows, Action::Update, resource.name(), Some(id))
    }

    #[instrument(level = "info", skip(self, ids, data), fields(%resource, n = ids.len()))]
    pub async fn update_many(&self, resource: Resource, ids: &[Value], data: Record) -> AdminResult<Vec<Value>> {
        resource.validate(&data, WriteMode::Update)?;
        if resource.is_config_union() {
            return config_union::update_many(self, ids, data).await;
        }
        self.store
            .update(resource.table(), &[Condition::is_in("id", ids.to_vec())], data)
            .await
            .map_err(|e| AdminError::from_store(Action::Update, resource.name(), e))?;
        Ok(ids.to_vec())
    }

    #[instrument(level = "info", skip(self, previous), fields(%resource))]
    pub async fn delete(&self, resource: Resource, id: &Value, previous: Option<&Record>) -> AdminResult<Record> {
        if resource.is_config_union() {
            return config_union::delete(self, &id_string(id), previous).await;
        }
        let rows = self
            .store
            .delete(resource.table(), &[Condition::eq("id", id.clone())])
            .await
            .map_err(|e| AdminError::from_store(Action::Delete, resource.name(), e))?;
        single(rows, Action::Delete, resource.name(), Some(id))
    }

    #[instrument(level = "info", skip(self, ids), fields(%resource, n = ids.len()))]
    pub async fn delete_many(&self, resource: Resource, ids: &[Value]) -> AdminResult<Vec<Value>> {
        if resource.is_config_union() {
            return config_union::delete_many(self, ids).await;
        }
        self.store
            .delete(resource.table(), &[Condition::is_in("id", ids.to_vec())])
            .await
            .map_err(|e| AdminError::from_store(Action::Delete, resource.name(), e))?;
        Ok(ids.to_vec())
    }

    /// Pool size for `criteria`, computed by the backend.
    #[instrument(level = "info", skip(self))]
    pub async fn question_count_by_criteria(&self, criteria: &PoolSelectionCriteria) -> AdminResult<u64> {
        let value = self
            .store
            .rpc(QUESTION_COUNT_FN, criteria.rpc_args(None))
            .await
            .map_err(|e| match e {
                StoreError::Unauthorized { message, .. } => AdminError::Unauthorized(message),
                e => AdminError::PoolCount(e.to_string()),
            })?;
        as_count(&value).ok_or_else(|| AdminError::PoolCount(format!("unexpected result {value}")))
    }

    /// Ask the backend to (re)build a session's question pool. Sampling and
    /// insertion happen atomically inside the procedure.
    #[instrument(level = "info", skip(self))]
    pub async fn populate_session_question_pool(
        &self,
        session_id: &Value,
        criteria: &PoolSelectionCriteria,
    ) -> AdminResult<u64> {
        let value = self
            .store
            .rpc(POPULATE_POOL_FN, criteria.rpc_args(Some(session_id)))
            .await
            .map_err(|e| match e {
                StoreError::Unauthorized { message, .. } => AdminError::Unauthorized(message),
                e => AdminError::PoolPopulate(e.to_string()),
            })?;
        let count = as_count(&value).ok_or_else(|| AdminError::PoolPopulate(format!("unexpected result {value}")))?;
        info!(target: "pool", session = %id_string(session_id), count, "session pool populated");
        Ok(count)
    }

    /// Persist new positions: one independent update per item, all in flight
    /// at once. There is no transaction; when an update fails, the first
    /// failure in input order is reported and the others stay applied.
    #[instrument(level = "info", skip(self, items), fields(%resource, n = items.len()))]
    pub async fn batch_update_order(&self, resource: Resource, items: &[OrderUpdate]) -> AdminResult<usize> {
        let updates = items.iter().map(|item| {
            let store = self.store.clone();
            let mut patch = Record::new();
            patch.insert("order".into(), json!(item.order));
            let cond = [Condition::eq("id", item.id.clone())];
            async move { store.update(resource.table(), &cond, patch).await }
        });
        let results = join_all(updates).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if let Some(Err(first)) = results.into_iter().find(|r| r.is_err()) {
            warn!(target: "ordering", %resource, failed, total = items.len(), error = %first, "order update failed");
            return Err(match first {
                StoreError::Unauthorized { message, .. } => AdminError::Unauthorized(message),
                e => AdminError::Ordering(e.to_string()),
            });
        }
        info!(target: "ordering", %resource, updated = items.len(), "order saved");
        Ok(items.len())
    }
}

/// Translate a list filter into conditions: `q` searches text and name,
/// text-like columns match by substring, arrays mean membership.
fn filter_conditions(filter: &Record) -> Vec<Condition> {
    filter
        .iter()
        .map(|(key, value)| match (key.as_str(), value) {
            ("q", v) => {
                let pattern = format!("%{}%", id_string(v));
                Condition::AnyOf(vec![
                    Condition::ilike("text", pattern.clone()),
                    Condition::ilike("name", pattern),
                ])
            }
            (k, v) if TEXT_FILTERS.contains(&k) && !v.is_null() => {
                Condition::ilike(k, format!("%{}%", id_string(v)))
            }
            (k, Value::Array(values)) => Condition::is_in(k, values.clone()),
            (k, v) => Condition::eq(k, v.clone()),
        })
        .collect()
}

/// Exactly one affected row is expected; zero means the policy hid it.
fn single(rows: Vec<Record>, action: Action, resource: &str, id: Option<&Value>) -> AdminResult<Record> {
    rows.into_iter().next().ok_or_else(|| AdminError::NoRows {
        action,
        resource: resource.to_string(),
        id: id.map(id_string),
    })
}

/// Procedures return either a bare number or a one-row result set.
fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        Value::Array(items) => items.first().and_then(as_count),
        Value::Object(obj) => obj.values().next().and_then(as_count),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, Rows};
    use crate::protocol::{Pagination, Sort};
    use crate::seeds::demo_dataset;
    use async_trait::async_trait;

    fn memory() -> MemoryStore {
        MemoryStore::from_dataset(demo_dataset()).unwrap()
    }

    fn provider_on(store: MemoryStore) -> DataProvider {
        DataProvider::new(Arc::new(store))
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn filters_translate_to_conditions() {
        let filter = rec(json!({"q": "past", "name": "verb", "status": "active", "id": [1, 2]}));
        let conds = filter_conditions(&filter);
        assert!(conds.contains(&Condition::ilike("name", "%verb%")));
        assert!(conds.contains(&Condition::eq("status", "active")));
        assert!(conds.contains(&Condition::is_in("id", vec![json!(1), json!(2)])));
        assert!(conds.contains(&Condition::AnyOf(vec![
            Condition::ilike("text", "%past%"),
            Condition::ilike("name", "%past%"),
        ])));
    }

    #[test]
    fn counts_come_in_several_shapes() {
        assert_eq!(as_count(&json!(4)), Some(4));
        assert_eq!(as_count(&json!([{"count": 9}])), Some(9));
        assert_eq!(as_count(&json!("12")), Some(12));
        assert_eq!(as_count(&json!(null)), None);
    }

    #[tokio::test]
    async fn list_paginates_and_reports_total() {
        let p = provider_on(memory());
        let params = ListParams::new(Pagination::new(2, 2), Sort::asc("id"));
        let page = p.get_list(Resource::Questions, &params).await.unwrap();
        assert_eq!(page.total, 6);
        let ids: Vec<i64> = page.data.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn list_search_and_equality_filters() {
        let p = provider_on(memory());
        let params = ListParams::new(Pagination::new(1, 25), Sort::asc("id"))
            .filter("q", "SCHOOL")
            .filter("status", "active");
        let page = p.get_list(Resource::Questions, &params).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0]["id"], 1);
    }

    #[tokio::test]
    async fn get_one_missing_row_mentions_rls() {
        let p = provider_on(memory());
        let err = p.get_one(Resource::Lessons, &json!(99)).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lessons with id 99 not found"));
        assert!(msg.contains("SELECT permissions on the lessons table"));
    }

    #[tokio::test]
    async fn create_validates_then_inserts() {
        let p = provider_on(memory());
        let bad = rec(json!({"name": "Idioms", "status": "published"}));
        assert!(matches!(p.create(Resource::Blocks, bad).await, Err(AdminError::Validation { .. })));

        let created = p.create(Resource::Blocks, rec(json!({"name": "Idioms", "order": 3, "status": "draft"}))).await.unwrap();
        assert_eq!(created["id"], 3);
        assert_eq!(p.get_one(Resource::Blocks, &json!(3)).await.unwrap()["name"], "Idioms");
    }

    #[tokio::test]
    async fn update_of_invisible_row_is_an_rls_error() {
        let p = provider_on(memory());
        let err = p
            .update(Resource::Sessions, &json!(77), rec(json!({"name": "x"})), None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to update sessions with id 77."));
        let ok = p.update(Resource::Sessions, &json!(1), rec(json!({"name": "Warm-up"})), None).await.unwrap();
        assert_eq!(ok["name"], "Warm-up");
    }

    #[tokio::test]
    async fn delete_and_bulk_operations() {
        let p = provider_on(memory());
        let gone = p.delete(Resource::Questions, &json!(6), None).await.unwrap();
        assert_eq!(gone["id"], 6);
        assert!(p.delete(Resource::Questions, &json!(6), None).await.is_err());

        let ids = vec![json!(1), json!(2)];
        p.update_many(Resource::Questions, &ids, rec(json!({"status": "archived"}))).await.unwrap();
        let many = p.get_many(Resource::Questions, &ids).await.unwrap();
        assert!(many.iter().all(|r| r["status"] == "archived"));
        let deleted = p.delete_many(Resource::Questions, &ids).await.unwrap();
        assert_eq!(deleted, ids);
        assert!(p.get_many(Resource::Questions, &ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn many_reference_filters_by_target() {
        let p = provider_on(memory());
        let params = ListParams::new(Pagination::new(1, 10), Sort::desc("order"));
        let sessions = p.get_many_reference(Resource::Sessions, "lesson_id", &json!(1), &params).await.unwrap();
        assert_eq!(sessions.total, 2);
        assert_eq!(sessions.data[0]["order"], 2);
    }

    #[tokio::test]
    async fn batch_order_update_applies_every_item() {
        let store = memory();
        let p = provider_on(store.clone());
        let items = vec![
            OrderUpdate { id: json!(1), order: 2 },
            OrderUpdate { id: json!(2), order: 1 },
        ];
        assert_eq!(p.batch_update_order(Resource::Blocks, &items).await.unwrap(), 2);
        let blocks = store.rows("blocks").await;
        assert_eq!(blocks.iter().find(|r| r["id"] == 1).unwrap()["order"], 2);
        assert_eq!(blocks.iter().find(|r| r["id"] == 2).unwrap()["order"], 1);
    }

    /// Fails updates for one id, delegating everything else.
    struct FlakyStore {
        inner: MemoryStore,
        poisoned: Value,
    }

    #[async_trait]
    impl TableStore for FlakyStore {
        fn kind(&self) -> &'static str {
            "flaky"
        }
        async fn select(&self, table: &str, query: &Select) -> Result<Rows, StoreError> {
            self.inner.select(table, query).await
        }
        async fn insert(&self, table: &str, row: Record) -> Result<Vec<Record>, StoreError> {
            self.inner.insert(table, row).await
        }
        async fn update(&self, table: &str, conditions: &[Condition], patch: Record) -> Result<Vec<Record>, StoreError> {
            if conditions.contains(&Condition::eq("id", self.poisoned.clone())) {
                return Err(StoreError::Http { status: 500, message: "connection reset".into() });
            }
            self.inner.update(table, conditions, patch).await
        }
        async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Record>, StoreError> {
            self.inner.delete(table, conditions).await
        }
        async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
            self.inner.rpc(function, args).await
        }
        fn authorized(&self, _bearer: Option<&str>) -> Arc<dyn TableStore> {
            Arc::new(FlakyStore { inner: self.inner.clone(), poisoned: self.poisoned.clone() })
        }
    }

    #[tokio::test]
    async fn batch_order_failure_leaves_other_updates_committed() {
        let inner = memory();
        let p = DataProvider::new(Arc::new(FlakyStore { inner: inner.clone(), poisoned: json!(2) }));
        let items = vec![
            OrderUpdate { id: json!(1), order: 5 },
            OrderUpdate { id: json!(2), order: 6 },
        ];
        let err = p.batch_update_order(Resource::Blocks, &items).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to update order:"));
        let blocks = inner.rows("blocks").await;
        assert_eq!(blocks.iter().find(|r| r["id"] == 1).unwrap()["order"], 5);
        assert_eq!(blocks.iter().find(|r| r["id"] == 2).unwrap()["order"], 2);
    }

    #[tokio::test]
    async fn pool_procedures() {
        let store = memory();
        let p = provider_on(store.clone());
        let criteria = PoolSelectionCriteria { concept_id: Some("1".into()), ..Default::default() };
        assert_eq!(p.question_count_by_criteria(&criteria).await.unwrap(), 2);
        assert_eq!(p.populate_session_question_pool(&json!(1), &criteria).await.unwrap(), 2);
        assert_eq!(store.rows("session_question_pool").await.len(), 2);
    }
}
