//! The `app_configuration` resource: two physical tables (`app_configuration`
//! and `learning_path_config`) presented as one collection keyed by
//! `config_key`.
//!
//! A union cannot be expressed as a single backend query, so lists fetch both
//! tables in full and filter, sort and paginate in memory. Both tables are
//! small. Every returned record carries `id = config_key` and a
//! `source_table` tag naming where it lives.

use futures::future::try_join;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{single, DataProvider};
use crate::backend::{Condition, Select};
use crate::domain::{ConfigTable, Resource};
use crate::error::{Action, AdminError, AdminResult};
use crate::protocol::{ListParams, ListResult};
use crate::records::{field_contains, id_string, slice_range, sort_records, values_equal, Record};

const KEY: &str = "config_key";

fn tag(mut record: Record, table: ConfigTable) -> Record {
    if let Some(key) = record.get(KEY).cloned() {
        record.insert("id".into(), key);
    }
    record.insert("source_table".into(), Value::String(table.as_str().to_string()));
    record
}

/// Fields that describe the union rather than the row.
fn strip_virtual(mut record: Record) -> Record {
    record.remove("source_table");
    record.remove("id");
    record
}

async fn fetch(provider: &DataProvider, table: ConfigTable, query: &Select) -> AdminResult<Vec<Record>> {
    let rows = provider
        .store()
        .select(table.as_str(), query)
        .await
        .map_err(|e| AdminError::from_store(Action::List, table.as_str(), e))?;
    Ok(rows.data.into_iter().map(|r| tag(r, table)).collect())
}

/// Run the same select on both tables concurrently; app_configuration rows first.
async fn fetch_both(provider: &DataProvider, query: &Select) -> AdminResult<Vec<Record>> {
    let (mut app, learning) = try_join(
        fetch(provider, ConfigTable::AppConfiguration, query),
        fetch(provider, ConfigTable::LearningPathConfig, query),
    )
    .await?;
    app.extend(learning);
    Ok(app)
}

fn keep(record: &Record, filter: &Record) -> bool {
    filter.iter().all(|(key, value)| match key.as_str() {
        "q" => {
            let needle = id_string(value).to_lowercase();
            field_contains(record, KEY, &needle) || field_contains(record, "description", &needle)
        }
        _ => record.get(key).is_some_and(|v| values_equal(v, value)),
    })
}

#[instrument(level = "debug", skip(provider, params))]
pub(super) async fn get_list(provider: &DataProvider, params: &ListParams) -> AdminResult<ListResult> {
    let mut combined = fetch_both(provider, &Select::all()).await?;
    combined.retain(|r| keep(r, &params.filter));
    sort_records(&mut combined, &params.sort.field, params.sort.order);

    let total = combined.len() as u64;
    let (start, end) = params.pagination.range();
    let data = slice_range(combined, start, end);
    debug!(target: "provider", total, returned = data.len(), "configuration union listed");
    Ok(ListResult { data, total })
}

#[instrument(level = "debug", skip(provider))]
pub(super) async fn get_one(provider: &DataProvider, key: &str) -> AdminResult<Record> {
    let query = Select::all().filter(Condition::eq(KEY, key));
    let (app, learning) = futures::join!(
        fetch(provider, ConfigTable::AppConfiguration, &query),
        fetch(provider, ConfigTable::LearningPathConfig, &query),
    );
    // Whichever lookup succeeded with a row wins; app_configuration first.
    // Without a hit, a failed lookup is reported instead of "not found".
    let mut failure = None;
    for rows in [app, learning] {
        match rows {
            Ok(rows) => {
                if let Some(record) = rows.into_iter().next() {
                    return Ok(record);
                }
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    Err(failure.unwrap_or_else(|| AdminError::ConfigNotFound(key.to_string())))
}

#[instrument(level = "debug", skip(provider, keys), fields(n = keys.len()))]
pub(super) async fn get_many(provider: &DataProvider, keys: &[Value]) -> AdminResult<Vec<Record>> {
    fetch_both(provider, &Select::all().filter(Condition::is_in(KEY, keys.to_vec()))).await
}

#[instrument(level = "debug", skip(provider, data))]
pub(super) async fn create(provider: &DataProvider, data: Record) -> AdminResult<Record> {
    let table = ConfigTable::of_record(&data).unwrap_or_default();
    let rows = provider
        .store()
        .insert(table.as_str(), strip_virtual(data))
        .await
        .map_err(|e| AdminError::from_store(Action::Create, table.as_str(), e))?;
    Ok(tag(single(rows, Action::Create, table.as_str(), None)?, table))
}

#[instrument(level = "debug", skip(provider, data, previous))]
pub(super) async fn update(
    provider: &DataProvider,
    key: &str,
    data: Record,
    previous: Option<&Record>,
) -> AdminResult<Record> {
    let table = ConfigTable::of_record(&data)
        .or_else(|| previous.and_then(ConfigTable::of_record))
        .unwrap_or_default();
    let rows = provider
        .store()
        .update(table.as_str(), &[Condition::eq(KEY, key)], strip_virtual(data))
        .await
        .map_err(|e| AdminError::from_store(Action::Update, table.as_str(), e))?;
    let id = Value::String(key.to_string());
    Ok(tag(single(rows, Action::Update, table.as_str(), Some(&id))?, table))
}

#[instrument(level = "debug", skip(provider, previous))]
pub(super) async fn delete(provider: &DataProvider, key: &str, previous: Option<&Record>) -> AdminResult<Record> {
    let table = previous.and_then(ConfigTable::of_record).unwrap_or_default();
    let rows = provider
        .store()
        .delete(table.as_str(), &[Condition::eq(KEY, key)])
        .await
        .map_err(|e| AdminError::from_store(Action::Delete, table.as_str(), e))?;
    let id = Value::String(key.to_string());
    Ok(tag(single(rows, Action::Delete, table.as_str(), Some(&id))?, table))
}

/// Bulk updates apply to whichever table holds each key.
#[instrument(level = "debug", skip(provider, keys, data), fields(n = keys.len()))]
pub(super) async fn update_many(provider: &DataProvider, keys: &[Value], data: Record) -> AdminResult<Vec<Value>> {
    let data = strip_virtual(data);
    let cond = [Condition::is_in(KEY, keys.to_vec())];
    for table in ConfigTable::BOTH {
        provider
            .store()
            .update(table.as_str(), &cond, data.clone())
            .await
            .map_err(|e| AdminError::from_store(Action::Update, Resource::AppConfiguration.name(), e))?;
    }
    Ok(keys.to_vec())
}

#[instrument(level = "debug", skip(provider, keys), fields(n = keys.len()))]
pub(super) async fn delete_many(provider: &DataProvider, keys: &[Value]) -> AdminResult<Vec<Value>> {
    let cond = [Condition::is_in(KEY, keys.to_vec())];
    for table in ConfigTable::BOTH {
        provider
            .store()
            .delete(table.as_str(), &cond)
            .await
            .map_err(|e| AdminError::from_store(Action::Delete, Resource::AppConfiguration.name(), e))?;
    }
    Ok(keys.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, Rows, TableStore};
    use crate::error::StoreError;
    use crate::protocol::{Pagination, Sort, SortOrder};
    use crate::seeds::demo_dataset;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryStore, DataProvider) {
        let store = MemoryStore::from_dataset(demo_dataset()).unwrap();
        (store.clone(), DataProvider::new(Arc::new(store)))
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn keys(list: &ListResult) -> Vec<&str> {
        list.data.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn list_merges_sorts_and_paginates_both_tables() {
        let (_, p) = setup();
        let params = ListParams::new(Pagination::new(1, 2), Sort::asc("config_key"));
        let page = p.get_list(Resource::AppConfiguration, &params).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(keys(&page), vec!["daily_xp_goal", "lesson_unlock_threshold"]);
        assert_eq!(page.data[1]["source_table"], "learning_path_config");

        let params = ListParams::new(Pagination::new(2, 2), Sort { field: "config_key".into(), order: SortOrder::Asc });
        let page = p.get_list(Resource::AppConfiguration, &params).await.unwrap();
        assert_eq!(keys(&page), vec!["max_lives"]);
    }

    #[tokio::test]
    async fn list_filters_in_memory() {
        let (_, p) = setup();
        let search = ListParams::new(Pagination::new(1, 25), Sort::desc("config_key")).filter("q", "UNLOCK");
        assert_eq!(keys(&p.get_list(Resource::AppConfiguration, &search).await.unwrap()), vec!["lesson_unlock_threshold"]);

        let by_category = ListParams::new(Pagination::new(1, 25), Sort::desc("config_key")).filter("category", "gamification");
        assert_eq!(keys(&p.get_list(Resource::AppConfiguration, &by_category).await.unwrap()), vec!["max_lives", "daily_xp_goal"]);

        let by_table = ListParams::new(Pagination::new(1, 25), Sort::asc("config_key"))
            .filter("source_table", "learning_path_config");
        assert_eq!(p.get_list(Resource::AppConfiguration, &by_table).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn get_one_searches_both_tables() {
        let (_, p) = setup();
        let rec = p.get_one(Resource::AppConfiguration, &json!("lesson_unlock_threshold")).await.unwrap();
        assert_eq!(rec["source_table"], "learning_path_config");
        assert_eq!(rec["id"], "lesson_unlock_threshold");
        let err = p.get_one(Resource::AppConfiguration, &json!("nope")).await.unwrap_err();
        assert_eq!(err.to_string(), "Configuration with key nope not found in either table");
    }

    /// Rejects every select on `denied` the way row-level security does.
    struct Denying {
        inner: MemoryStore,
        denied: &'static [&'static str],
    }

    #[async_trait]
    impl TableStore for Denying {
        fn kind(&self) -> &'static str {
            "denying"
        }
        async fn select(&self, table: &str, query: &Select) -> Result<Rows, StoreError> {
            if self.denied.contains(&table) {
                return Err(StoreError::Unauthorized { status: 401, message: "JWT expired".into() });
            }
            self.inner.select(table, query).await
        }
        async fn insert(&self, table: &str, row: Record) -> Result<Vec<Record>, StoreError> {
            self.inner.insert(table, row).await
        }
        async fn update(&self, table: &str, conditions: &[Condition], patch: Record) -> Result<Vec<Record>, StoreError> {
            self.inner.update(table, conditions, patch).await
        }
        async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Record>, StoreError> {
            self.inner.delete(table, conditions).await
        }
        async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
            self.inner.rpc(function, args).await
        }
        fn authorized(&self, _bearer: Option<&str>) -> Arc<dyn TableStore> {
            Arc::new(Denying { inner: self.inner.clone(), denied: self.denied })
        }
    }

    fn denying(denied: &'static [&'static str]) -> DataProvider {
        let (store, _) = setup();
        DataProvider::new(Arc::new(Denying { inner: store, denied }))
    }

    #[tokio::test]
    async fn get_one_reports_auth_failures_instead_of_not_found() {
        let p = denying(&["app_configuration", "learning_path_config"]);
        let err = p.get_one(Resource::AppConfiguration, &json!("max_lives")).await.unwrap_err();
        assert!(matches!(err, AdminError::Unauthorized(ref m) if m == "JWT expired"));
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        // The key lives in the denied table, so a miss on the other one is not "not found".
        let p = denying(&["app_configuration"]);
        let err = p.get_one(Resource::AppConfiguration, &json!("max_lives")).await.unwrap_err();
        assert!(matches!(err, AdminError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn get_one_hit_wins_over_a_failed_lookup() {
        let p = denying(&["app_configuration"]);
        let rec = p.get_one(Resource::AppConfiguration, &json!("lesson_unlock_threshold")).await.unwrap();
        assert_eq!(rec["source_table"], "learning_path_config");
    }

    #[tokio::test]
    async fn create_routes_to_the_named_table() {
        let (store, p) = setup();
        let data = rec(json!({
            "config_key": "streak_freeze_cost", "config_value": 200, "data_type": "integer",
            "category": "gamification", "source_table": "learning_path_config"
        }));
        let created = p.create(Resource::AppConfiguration, data).await.unwrap();
        assert_eq!(created["id"], "streak_freeze_cost");
        assert_eq!(created["source_table"], "learning_path_config");
        let stored = store.rows("learning_path_config").await;
        let row = stored.iter().find(|r| r["config_key"] == "streak_freeze_cost").unwrap();
        assert!(!row.contains_key("source_table"));
    }

    #[tokio::test]
    async fn update_uses_previous_source_table_when_data_has_none() {
        let (store, p) = setup();
        let previous = rec(json!({"id": "lesson_unlock_threshold", "source_table": "learning_path_config"}));
        let updated = p
            .update(
                Resource::AppConfiguration,
                &json!("lesson_unlock_threshold"),
                rec(json!({"id": "lesson_unlock_threshold", "config_value": 0.9})),
                Some(&previous),
            )
            .await
            .unwrap();
        assert_eq!(updated["config_value"], 0.9);
        assert!(store.rows("learning_path_config").await.iter().all(|r| !r.contains_key("source_table")));

        // Without a hint the default table is used, where the key does not exist.
        let err = p
            .update(Resource::AppConfiguration, &json!("lesson_unlock_threshold"), rec(json!({"config_value": 1})), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("app_configuration"));
    }

    #[tokio::test]
    async fn delete_and_bulk_delete() {
        let (store, p) = setup();
        let deleted = p.delete(Resource::AppConfiguration, &json!("max_lives"), None).await.unwrap();
        assert_eq!(deleted["source_table"], "app_configuration");

        let keys = vec![json!("daily_xp_goal"), json!("lesson_unlock_threshold")];
        p.delete_many(Resource::AppConfiguration, &keys).await.unwrap();
        assert!(store.rows("app_configuration").await.is_empty());
        assert!(store.rows("learning_path_config").await.is_empty());
    }
}
