//! Landing-page statistics: content totals, status tallies, recent activity
//! and concepts that are short of questions.

use futures::future::{try_join, try_join_all};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::config::DashboardCfg;
use crate::domain::{ContentStatus, Resource};
use crate::error::{AdminError, AdminResult};
use crate::protocol::{ListParams, Pagination, Sort};
use crate::provider::DataProvider;
use crate::records::Record;

/// Resources counted in the totals, in display order.
const TOTALED: [Resource; 7] = [
    Resource::Blocks,
    Resource::Topics,
    Resource::Headings,
    Resource::Concepts,
    Resource::Questions,
    Resource::Lessons,
    Resource::Sessions,
];

/// Resources whose statuses feed the active/draft/archived tallies.
const STATUSED: [Resource; 6] = [
    Resource::Blocks,
    Resource::Topics,
    Resource::Headings,
    Resource::Concepts,
    Resource::Questions,
    Resource::Lessons,
];

const CONCEPT_SCAN_LIMIT: u64 = 1000;

/// Per-concept question counts kept in flight at once.
const CONCEPT_COUNT_CONCURRENCY: usize = 8;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusTally {
    pub active: u64,
    pub draft: u64,
    pub archived: u64,
}

impl StatusTally {
    fn add(&mut self, status: ContentStatus, n: u64) {
        match status {
            ContentStatus::Active => self.active += n,
            ContentStatus::Draft => self.draft += n,
            ContentStatus::Archived => self.archived += n,
        }
    }

    /// Share of live content that is active, as a whole percentage.
    pub fn completion_rate(&self) -> u64 {
        let live = self.active + self.draft;
        if live == 0 {
            return 0;
        }
        ((self.active as f64 / live as f64) * 100.0).round() as u64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LowQuestionConcept {
    pub id: Value,
    pub name: String,
    pub question_count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardStats {
    /// `(resource name, total)` in display order.
    pub totals: Vec<(String, u64)>,
    pub status: StatusTally,
    pub completion_rate: u64,
    pub recent_questions: Vec<Record>,
    pub recent_lessons: Vec<Record>,
    pub low_question_concepts: Vec<LowQuestionConcept>,
}

async fn count(provider: &DataProvider, resource: Resource, filter: Option<(&str, Value)>) -> AdminResult<u64> {
    let mut params = ListParams::new(Pagination::new(1, 1), Sort::asc("id"));
    if let Some((key, value)) = filter {
        params = params.filter(key, value);
    }
    Ok(provider.get_list(resource, &params).await?.total)
}

async fn recent(provider: &DataProvider, resource: Resource, limit: u64) -> AdminResult<Vec<Record>> {
    let params = ListParams::new(Pagination::new(1, limit), Sort::desc("created_at"));
    Ok(provider.get_list(resource, &params).await?.data)
}

async fn tally(provider: &DataProvider) -> AdminResult<StatusTally> {
    let lookups = STATUSED.iter().flat_map(move |&resource| {
        ContentStatus::ALL.into_iter().map(move |status| async move {
            let n = count(provider, resource, Some(("status", Value::from(status.as_str())))).await?;
            Ok::<_, AdminError>((status, n))
        })
    });
    let mut tally = StatusTally::default();
    for (status, n) in try_join_all(lookups).await? {
        tally.add(status, n);
    }
    Ok(tally)
}

async fn low_question_concepts(provider: &DataProvider, threshold: u64) -> AdminResult<Vec<LowQuestionConcept>> {
    let params = ListParams::new(Pagination::new(1, CONCEPT_SCAN_LIMIT), Sort::asc("id"))
        .filter("status", ContentStatus::Active.as_str());
    let concepts = provider.get_list(Resource::Concepts, &params).await?.data;

    let ids: Vec<Value> = concepts
        .iter()
        .map(|concept| concept.get("id").cloned().unwrap_or(Value::Null))
        .collect();
    let counts: Vec<u64> = stream::iter(ids.into_iter().map(|id| async move {
        count(provider, Resource::Questions, Some(("concept_id", id))).await
    }))
    .buffered(CONCEPT_COUNT_CONCURRENCY)
    .try_collect()
    .await?;

    Ok(concepts
        .into_iter()
        .zip(counts)
        .filter(|(_, n)| *n < threshold)
        .map(|(concept, question_count)| LowQuestionConcept {
            id: concept.get("id").cloned().unwrap_or(Value::Null),
            name: concept.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            question_count,
        })
        .collect())
}

#[instrument(level = "info", skip(provider, cfg))]
pub async fn stats(provider: &DataProvider, cfg: &DashboardCfg) -> AdminResult<DashboardStats> {
    let totals = try_join_all(TOTALED.iter().map(|&r| count(provider, r, None))).await?;
    let status = tally(provider).await?;
    let (recent_questions, recent_lessons) = try_join(
        recent(provider, Resource::Questions, cfg.recent_limit),
        recent(provider, Resource::Lessons, cfg.recent_limit),
    )
    .await?;
    let low_question_concepts = low_question_concepts(provider, cfg.low_question_threshold).await?;

    info!(
        target: "admin_backend",
        active = status.active,
        draft = status.draft,
        low = low_question_concepts.len(),
        "dashboard stats computed"
    );
    Ok(DashboardStats {
        totals: TOTALED.iter().map(|r| r.name().to_string()).zip(totals).collect(),
        completion_rate: status.completion_rate(),
        status,
        recent_questions,
        recent_lessons,
        low_question_concepts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Condition, MemoryStore, Rows, Select, TableStore};
    use crate::error::StoreError;
    use crate::seeds::demo_dataset;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn provider() -> DataProvider {
        DataProvider::new(Arc::new(MemoryStore::from_dataset(demo_dataset()).unwrap()))
    }

    #[test]
    fn completion_rate_ignores_archived() {
        let t = StatusTally { active: 3, draft: 1, archived: 10 };
        assert_eq!(t.completion_rate(), 75);
        assert_eq!(StatusTally::default().completion_rate(), 0);
    }

    #[tokio::test]
    async fn stats_over_demo_data() {
        let s = stats(&provider(), &DashboardCfg::default()).await.unwrap();
        let total = |name: &str| s.totals.iter().find(|(n, _)| n == name).unwrap().1;
        assert_eq!(total("questions"), 6);
        assert_eq!(total("sessions"), 2);
        assert_eq!(s.totals.len(), 7);

        // blocks 1/1/0, topics 2/1/0, headings 3/1/0, concepts 3/1/1, questions 5/1/0, lessons 1/1/0
        assert_eq!(s.status, StatusTally { active: 15, draft: 6, archived: 1 });

        assert_eq!(s.recent_questions.len(), 5);
        assert_eq!(s.recent_questions[0]["id"], 6);
        assert_eq!(s.recent_lessons[0]["id"], 2);

        // Every active concept has fewer than ten questions in the demo set.
        let low: Vec<u64> = s.low_question_concepts.iter().map(|c| c.question_count).collect();
        assert_eq!(low, vec![3, 1, 1]);
    }

    /// Counts question lookups running at the same time.
    #[derive(Clone, Default)]
    struct InFlight {
        inner: MemoryStore,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TableStore for InFlight {
        fn kind(&self) -> &'static str {
            "in-flight"
        }
        async fn select(&self, table: &str, query: &Select) -> Result<Rows, StoreError> {
            if table != "questions" {
                return self.inner.select(table, query).await;
            }
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            let rows = self.inner.select(table, query).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            rows
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
            Arc::new(self.clone())
        }
    }

    #[tokio::test]
    async fn concept_scan_limits_concurrent_counts() {
        let store = InFlight::default();
        for i in 0..40 {
            let row = json!({"name": format!("Concept {i}"), "status": "active"});
            store.inner.insert("concepts", row.as_object().cloned().unwrap()).await.unwrap();
        }
        let low = low_question_concepts(&DataProvider::new(Arc::new(store.clone())), 1).await.unwrap();
        assert_eq!(low.len(), 40);
        assert_eq!(low[0].name, "Concept 0");
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak > 1 && peak <= CONCEPT_COUNT_CONCURRENCY, "peak {peak}");
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let cfg = DashboardCfg { low_question_threshold: 2, ..DashboardCfg::default() };
        let s = stats(&provider(), &cfg).await.unwrap();
        let names: Vec<&str> = s.low_question_concepts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Regular past", "Will vs going to"]);
    }
}
