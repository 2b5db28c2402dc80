//! Public protocol structs for the HTTP API (serde ready).
//! The list/get/mutation shapes mirror what the dashboard's data layer expects:
//! `{ data, total }` for lists and `{ data }` for everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ordering::OrderedItem;
use crate::pool::{Choice, CriteriaEdit, HierarchyLevel, PoolPreview, PoolSelectionCriteria, PoolStatus};
use crate::records::Record;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    /// Inclusive row range for this page. Page numbers start at 1.
    pub fn range(&self) -> (u64, u64) {
        let page = self.page.max(1);
        let per_page = self.per_page.max(1);
        let start = (page - 1).saturating_mul(per_page);
        (start, start.saturating_add(per_page - 1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), order: SortOrder::Asc }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), order: SortOrder::Desc }
    }
}

/// Parameters of a generic list request.
#[derive(Clone, Debug)]
pub struct ListParams {
    pub pagination: Pagination,
    pub sort: Sort,
    pub filter: Record,
}

impl ListParams {
    pub fn new(pagination: Pagination, sort: Sort) -> Self {
        Self { pagination, sort, filter: Record::new() }
    }

    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ListResult {
    pub data: Vec<Record>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct RecordOut {
    pub data: Record,
}

#[derive(Debug, Serialize)]
pub struct RecordsOut {
    pub data: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct IdsOut {
    pub data: Vec<Value>,
}

//
// HTTP request DTOs
//

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    /// JSON object, e.g. `{"status":"active","q":"tense"}`.
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceQuery {
    pub target: String,
    pub id: String,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl ReferenceQuery {
    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            per_page: self.per_page,
            sort: self.sort.clone(),
            order: self.order,
            filter: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IdsIn {
    pub ids: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIn {
    pub data: Record,
    #[serde(default)]
    pub previous_data: Option<Record>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateManyIn {
    pub ids: Vec<Value>,
    pub data: Record,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// Which physical table a configuration entry lives in.
    pub source_table: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: Value,
    pub order: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderUpdateIn {
    pub data: Vec<OrderUpdate>,
}

#[derive(Debug, Serialize)]
pub struct CountOut {
    pub data: u64,
}

#[derive(Debug, Serialize)]
pub struct ItemsOut {
    pub data: Vec<OrderedItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderingQuery {
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveIn {
    #[serde(default)]
    pub parent_id: Option<Value>,
    pub active_id: Value,
    pub over_id: Value,
}

#[derive(Debug, Deserialize)]
pub struct PoolCountIn {
    #[serde(default)]
    pub criteria: PoolSelectionCriteria,
    #[serde(default)]
    pub required_questions: u64,
}

#[derive(Debug, Serialize)]
pub struct PoolPreviewOut {
    pub count: Option<u64>,
    pub required: u64,
    pub status: PoolStatus,
    pub message: String,
}

impl From<PoolPreview> for PoolPreviewOut {
    fn from(p: PoolPreview) -> Self {
        Self {
            count: p.count,
            required: p.required,
            status: p.status(),
            message: p.message(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PoolResolveIn {
    #[serde(default)]
    pub criteria: PoolSelectionCriteria,
    #[serde(default)]
    pub edits: Vec<CriteriaEdit>,
    #[serde(default)]
    pub required_questions: u64,
}

#[derive(Debug, Serialize)]
pub struct PoolResolveOut {
    pub criteria: PoolSelectionCriteria,
    pub level: HierarchyLevel,
    pub parent_level: Option<HierarchyLevel>,
    pub difficulty: (i64, i64),
    pub preview: PoolPreviewOut,
}

#[derive(Debug, Deserialize)]
pub struct ChoicesQuery {
    pub level: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChoicesOut {
    pub data: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    pub data: Record,
    #[serde(default)]
    pub criteria: Option<PoolSelectionCriteria>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub backend: &'static str,
}
