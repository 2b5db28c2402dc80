//! Table store abstraction over the hosted relational backend.
//!
//! The adapter only needs row filtering, sorting, range pagination, the three
//! mutations and stored-procedure calls. `PostgrestStore` speaks the hosted
//! REST surface; `MemoryStore` keeps the same contract in process for local
//! runs and tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::protocol::SortOrder;
use crate::records::Record;

pub mod memory;
pub mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

/// Stored procedure counting the questions a pool criteria matches.
pub const QUESTION_COUNT_FN: &str = "get_question_count_by_criteria";
/// Stored procedure rebuilding a session's question pool.
pub const POPULATE_POOL_FN: &str = "populate_session_question_pool";
/// Table the population procedure writes to.
pub const POOL_TABLE: &str = "session_question_pool";

/// One row predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Equality; `Value::Null` means IS NULL.
    Eq(String, Value),
    /// Case-insensitive pattern with `%` wildcards.
    ILike(String, String),
    In(String, Vec<Value>),
    /// OR group of the inner conditions.
    AnyOf(Vec<Condition>),
}

impl Condition {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Condition::Eq(field.to_string(), value.into())
    }

    pub fn ilike(field: &str, pattern: impl Into<String>) -> Self {
        Condition::ILike(field.to_string(), pattern.into())
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Condition::In(field.to_string(), values)
    }
}

/// A read query against one table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Select {
    pub conditions: Vec<Condition>,
    pub order: Option<(String, SortOrder)>,
    /// Inclusive row range.
    pub range: Option<(u64, u64)>,
    /// Ask the backend for the exact number of matching rows.
    pub count: bool,
}

impl Select {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order = Some((field.to_string(), order));
        self
    }

    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Rows {
    pub data: Vec<Record>,
    pub count: Option<u64>,
}

#[async_trait]
pub trait TableStore: Send + Sync + 'static {
    /// Short name for logs and the health endpoint.
    fn kind(&self) -> &'static str;

    async fn select(&self, table: &str, query: &Select) -> Result<Rows, StoreError>;

    /// Insert one row and return the stored representation.
    async fn insert(&self, table: &str, row: Record) -> Result<Vec<Record>, StoreError>;

    /// Patch every row matching `conditions`; returns the updated rows.
    async fn update(
        &self,
        table: &str,
        conditions: &[Condition],
        patch: Record,
    ) -> Result<Vec<Record>, StoreError>;

    /// Delete every row matching `conditions`; returns the deleted rows.
    async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Record>, StoreError>;

    /// Call a stored procedure with named arguments.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError>;

    /// A handle acting on behalf of the caller's bearer token, so the backend
    /// applies that user's row-level policies.
    fn authorized(&self, bearer: Option<&str>) -> Arc<dyn TableStore>;
}
