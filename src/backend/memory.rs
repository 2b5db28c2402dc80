//! In-process table store with the same contract as the hosted backend.
//!
//! Used for local runs (`ADMIN_BACKEND=memory`) and as the backend in tests.
//! Both stored procedures the dashboard relies on are implemented here too,
//! so pool previews and population behave end to end without a database.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::{Condition, Rows, Select, TableStore, POOL_TABLE, POPULATE_POOL_FN, QUESTION_COUNT_FN};
use crate::error::StoreError;
use crate::records::{compare_values, ilike, slice_range, sort_records, values_equal, Record};

#[derive(Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

impl Table {
    fn assign_id(&mut self, row: &mut Record) {
        match row.get("id") {
            Some(Value::Number(n)) => {
                if let Some(id) = n.as_i64() {
                    self.next_id = self.next_id.max(id);
                }
            }
            None | Some(Value::Null) => {
                self.next_id += 1;
                row.insert("id".into(), json!(self.next_id));
            }
            // Text keys (uuids) are kept as given.
            Some(_) => {}
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryStore {
    /// Build a store from `{ "table": [rows…], … }`.
    pub fn from_dataset(dataset: Value) -> Result<Self, StoreError> {
        let obj = dataset
            .as_object()
            .ok_or_else(|| StoreError::Decode("dataset must be a JSON object of tables".into()))?;
        let mut tables = HashMap::new();
        for (name, rows) in obj {
            let rows = rows
                .as_array()
                .ok_or_else(|| StoreError::Decode(format!("table {name} must be an array")))?;
            let mut table = Table::default();
            for row in rows {
                let mut row = row
                    .as_object()
                    .cloned()
                    .ok_or_else(|| StoreError::Decode(format!("row in {name} must be an object")))?;
                table.assign_id(&mut row);
                table.rows.push(row);
            }
            tables.insert(name.clone(), table);
        }
        let total: usize = tables.values().map(|t| t.rows.len()).sum();
        info!(target: "admin_backend", tables = tables.len(), rows = total, "Memory store loaded");
        Ok(Self { tables: Arc::new(RwLock::new(tables)) })
    }

    pub fn from_json_file(path: &str) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::Transport(format!("{path}: {e}")))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
        Self::from_dataset(value)
    }

    /// Snapshot of a table, mostly for assertions.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.read().await.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    async fn ids_where(&self, table: &str, field: &str, parents: &[Value]) -> Vec<Value> {
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else { return Vec::new() };
        t.rows
            .iter()
            .filter(|r| {
                let v = r.get(field).unwrap_or(&Value::Null);
                parents.iter().any(|p| values_equal(v, p))
            })
            .filter_map(|r| r.get("id").cloned())
            .collect()
    }

    /// Concepts under the most specific selected level. `None` means no
    /// hierarchy restriction.
    async fn concepts_for(&self, args: &Value) -> Option<Vec<Value>> {
        let arg = |k: &str| args.get(k).filter(|v| !v.is_null()).cloned();
        if let Some(concept) = arg("p_concept_id") {
            return Some(vec![concept]);
        }
        let headings = if let Some(heading) = arg("p_heading_id") {
            vec![heading]
        } else {
            let topics = if let Some(topic) = arg("p_topic_id") {
                vec![topic]
            } else {
                let block = arg("p_block_id")?;
                self.ids_where("topics", "block_id", &[block]).await
            };
            self.ids_where("headings", "topic_id", &topics).await
        };
        Some(self.ids_where("concepts", "heading_id", &headings).await)
    }

    /// Active questions matching a criteria argument object.
    async fn matching_questions(&self, args: &Value) -> Vec<Value> {
        let concepts = self.concepts_for(args).await;
        let min = args.get("p_min_difficulty").and_then(Value::as_i64);
        let max = args.get("p_max_difficulty").and_then(Value::as_i64);

        let tables = self.tables.read().await;
        let Some(questions) = tables.get("questions") else { return Vec::new() };
        questions
            .rows
            .iter()
            .filter(|q| q.get("status").and_then(Value::as_str) == Some("active"))
            .filter(|q| match &concepts {
                Some(ids) => {
                    let c = q.get("concept_id").unwrap_or(&Value::Null);
                    ids.iter().any(|id| values_equal(c, id))
                }
                None => true,
            })
            .filter(|q| {
                let d = q.get("difficulty").and_then(Value::as_i64).unwrap_or(0);
                min.map_or(true, |m| d >= m) && max.map_or(true, |m| d <= m)
            })
            .filter_map(|q| q.get("id").cloned())
            .collect()
    }

    async fn populate_pool(&self, args: &Value) -> Result<Value, StoreError> {
        let session_id = args
            .get("p_session_id")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| StoreError::Http { status: 400, message: "p_session_id is required".into() })?;
        let question_ids = self.matching_questions(args).await;

        let mut tables = self.tables.write().await;
        let pool = tables.entry(POOL_TABLE.to_string()).or_default();
        pool.rows.retain(|r| !values_equal(r.get("session_id").unwrap_or(&Value::Null), &session_id));
        for question_id in &question_ids {
            let mut row = Record::new();
            row.insert("session_id".into(), session_id.clone());
            row.insert("question_id".into(), question_id.clone());
            pool.assign_id(&mut row);
            pool.rows.push(row);
        }
        debug!(target: "pool", session = %session_id, inserted = question_ids.len(), "pool populated");
        Ok(json!(question_ids.len()))
    }
}

fn matches(row: &Record, cond: &Condition) -> bool {
    match cond {
        Condition::Eq(field, Value::Null) => row.get(field).map_or(true, Value::is_null),
        Condition::Eq(field, v) => row.get(field).is_some_and(|x| values_equal(x, v)),
        Condition::ILike(field, pattern) => row
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| ilike(s, pattern)),
        Condition::In(field, values) => row
            .get(field)
            .is_some_and(|x| values.iter().any(|v| values_equal(x, v))),
        Condition::AnyOf(inner) => inner.iter().any(|c| matches(row, c)),
    }
}

fn matches_all(row: &Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| matches(row, c))
}

#[async_trait]
impl TableStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    #[instrument(level = "debug", skip(self, query), fields(%table))]
    async fn select(&self, table: &str, query: &Select) -> Result<Rows, StoreError> {
        let tables = self.tables.read().await;
        let mut data: Vec<Record> = tables
            .get(table)
            .map(|t| t.rows.iter().filter(|r| matches_all(r, &query.conditions)).cloned().collect())
            .unwrap_or_default();
        drop(tables);

        if let Some((field, order)) = &query.order {
            sort_records(&mut data, field, *order);
        } else {
            data.sort_by(|a, b| {
                compare_values(a.get("id").unwrap_or(&Value::Null), b.get("id").unwrap_or(&Value::Null))
            });
        }
        let total = data.len() as u64;
        if let Some((start, end)) = query.range {
            data = slice_range(data, start, end);
        }
        Ok(Rows { data, count: query.count.then_some(total) })
    }

    #[instrument(level = "debug", skip(self, row), fields(%table))]
    async fn insert(&self, table: &str, mut row: Record) -> Result<Vec<Record>, StoreError> {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        if let Some(id) = row.get("id").filter(|v| !v.is_null()) {
            if t.rows.iter().any(|r| r.get("id").is_some_and(|x| values_equal(x, id))) {
                return Err(StoreError::Http {
                    status: 409,
                    message: format!("duplicate key value violates unique constraint \"{table}_pkey\""),
                });
            }
        }
        t.assign_id(&mut row);
        t.rows.push(row.clone());
        Ok(vec![row])
    }

    #[instrument(level = "debug", skip(self, conditions, patch), fields(%table))]
    async fn update(
        &self,
        table: &str,
        conditions: &[Condition],
        patch: Record,
    ) -> Result<Vec<Record>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(t) = tables.get_mut(table) else { return Ok(Vec::new()) };
        let mut updated = Vec::new();
        for row in t.rows.iter_mut().filter(|r| matches_all(r, conditions)) {
            for (k, v) in &patch {
                row.insert(k.clone(), v.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    #[instrument(level = "debug", skip(self, conditions), fields(%table))]
    async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Record>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(t) = tables.get_mut(table) else { return Ok(Vec::new()) };
        let (gone, kept): (Vec<Record>, Vec<Record>) =
            t.rows.drain(..).partition(|r| matches_all(r, conditions));
        t.rows = kept;
        Ok(gone)
    }

    #[instrument(level = "debug", skip(self, args), fields(%function))]
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
        match function {
            QUESTION_COUNT_FN => Ok(json!(self.matching_questions(&args).await.len())),
            POPULATE_POOL_FN => self.populate_pool(&args).await,
            other => Err(StoreError::Http {
                status: 404,
                message: format!("Could not find the function public.{other} in the schema cache"),
            }),
        }
    }

    fn authorized(&self, _bearer: Option<&str>) -> Arc<dyn TableStore> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SortOrder;
    use crate::seeds::demo_dataset;

    fn store() -> MemoryStore {
        MemoryStore::from_dataset(demo_dataset()).unwrap()
    }

    #[tokio::test]
    async fn select_filters_sorts_and_counts() {
        let s = store();
        let q = Select::all()
            .filter(Condition::eq("block_id", 1))
            .order_by("order", SortOrder::Desc)
            .range(0, 0)
            .with_count();
        let rows = s.select("topics", &q).await.unwrap();
        assert_eq!(rows.count, Some(2));
        assert_eq!(rows.data.len(), 1);
        assert_eq!(rows.data[0]["order"], 2);
    }

    #[tokio::test]
    async fn or_groups_and_ilike() {
        let s = store();
        let q = Select::all().filter(Condition::AnyOf(vec![
            Condition::ilike("text", "%SCHOOL%"),
            Condition::ilike("name", "%SCHOOL%"),
        ]));
        let rows = s.select("questions", &q).await.unwrap();
        assert!(!rows.data.is_empty());
        assert!(rows.data.iter().all(|r| r["text"].as_str().unwrap().to_lowercase().contains("school")));
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_rejects_duplicates() {
        let s = MemoryStore::default();
        let row = json!({"name": "Grammar"}).as_object().cloned().unwrap();
        let first = s.insert("blocks", row.clone()).await.unwrap();
        let second = s.insert("blocks", row).await.unwrap();
        assert_eq!(first[0]["id"], 1);
        assert_eq!(second[0]["id"], 2);
        let dup = json!({"id": 2, "name": "again"}).as_object().cloned().unwrap();
        assert!(matches!(s.insert("blocks", dup).await, Err(StoreError::Http { status: 409, .. })));
    }

    #[tokio::test]
    async fn update_and_delete_report_affected_rows() {
        let s = store();
        let patch = json!({"status": "archived"}).as_object().cloned().unwrap();
        let none = s.update("blocks", &[Condition::eq("id", 999)], patch.clone()).await.unwrap();
        assert!(none.is_empty());
        let one = s.update("blocks", &[Condition::eq("id", "1")], patch).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0]["status"], "archived");

        let gone = s.delete("blocks", &[Condition::eq("id", 2)]).await.unwrap();
        assert_eq!(gone.len(), 1);
        assert!(s.rows("blocks").await.iter().all(|r| r["id"] != 2));
    }

    #[tokio::test]
    async fn count_rpc_walks_the_hierarchy() {
        let s = store();
        let by_block = s.rpc(QUESTION_COUNT_FN, json!({"p_block_id": 1})).await.unwrap();
        let by_concept = s.rpc(QUESTION_COUNT_FN, json!({"p_concept_id": 1})).await.unwrap();
        let narrowed = s
            .rpc(QUESTION_COUNT_FN, json!({"p_block_id": 1, "p_min_difficulty": 4, "p_max_difficulty": 10}))
            .await
            .unwrap();
        assert!(by_block.as_u64().unwrap() >= by_concept.as_u64().unwrap());
        assert!(narrowed.as_u64().unwrap() < by_block.as_u64().unwrap());
    }

    #[tokio::test]
    async fn populate_replaces_previous_pool() {
        let s = store();
        let args = json!({"p_session_id": 1, "p_concept_id": 1});
        let n1 = s.rpc(POPULATE_POOL_FN, args.clone()).await.unwrap();
        let n2 = s.rpc(POPULATE_POOL_FN, args).await.unwrap();
        assert_eq!(n1, n2);
        let pool = s.rows(POOL_TABLE).await;
        assert_eq!(pool.len() as u64, n2.as_u64().unwrap());
    }

    #[tokio::test]
    async fn unknown_function_is_an_error() {
        let s = store();
        assert!(s.rpc("drop_everything", json!({})).await.is_err());
    }
}
