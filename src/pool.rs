//! Question-pool criteria: which slice of the syllabus a session draws from.
//!
//! A criteria selects exactly one hierarchy level (concept, heading, topic or
//! block) plus an optional difficulty range. Counting and population are done
//! by stored procedures on the backend; this module only shapes their
//! arguments and interprets the results.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::domain::{Resource, DIFFICULTY_MAX, DIFFICULTY_MIN};
use crate::error::AdminError;
use crate::protocol::{ListParams, Pagination, Sort};
use crate::provider::DataProvider;
use crate::records::{id_string, Record};
use crate::util::id_value;

/// Rows fetched for a selector dropdown.
const CHOICES_LIMIT: u64 = 1000;

/// Narrowest first, the order in which `level()` looks for a selection.
const LEVELS: [HierarchyLevel; 4] = [
    HierarchyLevel::Concept,
    HierarchyLevel::Heading,
    HierarchyLevel::Topic,
    HierarchyLevel::Block,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Concept,
    Heading,
    Topic,
    Block,
}

impl HierarchyLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "concept" => Some(HierarchyLevel::Concept),
            "heading" => Some(HierarchyLevel::Heading),
            "topic" => Some(HierarchyLevel::Topic),
            "block" => Some(HierarchyLevel::Block),
            _ => None,
        }
    }

    /// One level broader.
    pub fn parent(self) -> Option<Self> {
        match self {
            HierarchyLevel::Concept => Some(HierarchyLevel::Heading),
            HierarchyLevel::Heading => Some(HierarchyLevel::Topic),
            HierarchyLevel::Topic => Some(HierarchyLevel::Block),
            HierarchyLevel::Block => None,
        }
    }

    pub fn resource(self) -> Resource {
        match self {
            HierarchyLevel::Concept => Resource::Concepts,
            HierarchyLevel::Heading => Resource::Headings,
            HierarchyLevel::Topic => Resource::Topics,
            HierarchyLevel::Block => Resource::Blocks,
        }
    }

    pub fn parent_field(self) -> Option<&'static str> {
        self.resource().parent_field()
    }

    /// Session column holding this level's id.
    pub fn column(self) -> &'static str {
        match self {
            HierarchyLevel::Concept => "concept_id",
            HierarchyLevel::Heading => "heading_id",
            HierarchyLevel::Topic => "topic_id",
            HierarchyLevel::Block => "block_id",
        }
    }
}

/// Hierarchy ids are held as text. Integer keys arrive as JSON numbers and
/// are accepted as well; an empty string means no selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSelectionCriteria {
    #[serde(default, deserialize_with = "text_or_integer_id")]
    pub block_id: Option<String>,
    #[serde(default, deserialize_with = "text_or_integer_id")]
    pub topic_id: Option<String>,
    #[serde(default, deserialize_with = "text_or_integer_id")]
    pub heading_id: Option<String>,
    #[serde(default, deserialize_with = "text_or_integer_id")]
    pub concept_id: Option<String>,
    #[serde(default)]
    pub min_difficulty: Option<i64>,
    #[serde(default)]
    pub max_difficulty: Option<i64>,
    /// Level picked in the selector while no id is chosen yet.
    #[serde(default, rename = "level", skip_serializing_if = "Option::is_none")]
    pub pending_level: Option<HierarchyLevel>,
}

fn text_or_integer_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s).filter(|s| !s.is_empty())),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected an id, got {other}"))),
    }
}

/// Id text back to JSON: integer keys go out as numbers.
fn id_json(v: &Option<String>) -> Value {
    v.as_deref().map(id_value).unwrap_or(Value::Null)
}

/// Fields the session form carries that are not table columns.
const SESSION_FORM_ONLY: [&str; 6] = [
    "pool_selection_criteria",
    "concept_selection",
    "heading_selection",
    "topic_selection",
    "block_selection",
    "__temp__",
];

impl PoolSelectionCriteria {
    fn slot(&self, level: HierarchyLevel) -> &Option<String> {
        match level {
            HierarchyLevel::Concept => &self.concept_id,
            HierarchyLevel::Heading => &self.heading_id,
            HierarchyLevel::Topic => &self.topic_id,
            HierarchyLevel::Block => &self.block_id,
        }
    }

    fn slot_mut(&mut self, level: HierarchyLevel) -> &mut Option<String> {
        match level {
            HierarchyLevel::Concept => &mut self.concept_id,
            HierarchyLevel::Heading => &mut self.heading_id,
            HierarchyLevel::Topic => &mut self.topic_id,
            HierarchyLevel::Block => &mut self.block_id,
        }
    }

    fn clear_ids(&mut self) {
        self.block_id = None;
        self.topic_id = None;
        self.heading_id = None;
        self.concept_id = None;
    }

    /// Most specific level with an id. Without one, the level last switched
    /// to, then concept.
    pub fn level(&self) -> HierarchyLevel {
        LEVELS
            .into_iter()
            .find(|l| self.slot(*l).is_some())
            .or(self.pending_level)
            .unwrap_or(HierarchyLevel::Concept)
    }

    pub fn selected_id(&self, level: HierarchyLevel) -> Option<&str> {
        self.slot(level).as_deref()
    }

    pub fn has_selection(&self) -> bool {
        self.selected_id(self.level()).is_some()
    }

    /// Move to another level. Every hierarchy id is cleared; difficulty stays.
    pub fn switch_level(mut self, level: HierarchyLevel) -> Self {
        self.clear_ids();
        self.pending_level = Some(level);
        self
    }

    /// Select `id` at `level`, dropping any id held at another level.
    pub fn select(mut self, level: HierarchyLevel, id: Option<String>) -> Self {
        self.clear_ids();
        self.pending_level = Some(level);
        *self.slot_mut(level) = id.filter(|s| !s.is_empty());
        self
    }

    pub fn apply(self, edit: CriteriaEdit) -> Result<Self, AdminError> {
        match edit {
            CriteriaEdit::SwitchLevel { level } => Ok(self.switch_level(level)),
            CriteriaEdit::Select { level, id } => Ok(self.select(level, id)),
            CriteriaEdit::Difficulty { min, max } => self.with_difficulty(min, max),
        }
    }

    pub fn with_difficulty(mut self, min: Option<i64>, max: Option<i64>) -> Result<Self, AdminError> {
        self.min_difficulty = min;
        self.max_difficulty = max;
        self.validate()?;
        Ok(self)
    }

    /// Effective bounds, defaulting to the full 1..=10 scale.
    pub fn difficulty_bounds(&self) -> (i64, i64) {
        (
            self.min_difficulty.unwrap_or(DIFFICULTY_MIN),
            self.max_difficulty.unwrap_or(DIFFICULTY_MAX),
        )
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        let selected = [&self.block_id, &self.topic_id, &self.heading_id, &self.concept_id]
            .iter()
            .filter(|s| s.is_some())
            .count();
        if selected > 1 {
            return Err(AdminError::validation(
                "pool_selection_criteria",
                "select exactly one of concept, heading, topic or block",
            ));
        }
        for d in [self.min_difficulty, self.max_difficulty].into_iter().flatten() {
            if !(DIFFICULTY_MIN..=DIFFICULTY_MAX).contains(&d) {
                return Err(AdminError::validation(
                    "pool_selection_criteria",
                    format!("difficulty must be between 1 and 10 (got {d})"),
                ));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_difficulty, self.max_difficulty) {
            if lo > hi {
                return Err(AdminError::validation(
                    "pool_selection_criteria",
                    format!("min_difficulty {lo} exceeds max_difficulty {hi}"),
                ));
            }
        }
        Ok(())
    }

    /// Named arguments for the count and population procedures. Unset values
    /// (and a zero difficulty) are sent as null.
    pub fn rpc_args(&self, session_id: Option<&Value>) -> Value {
        let diff = |v: Option<i64>| v.filter(|d| *d != 0).map(Value::from).unwrap_or(Value::Null);
        let mut args = json!({
            "p_block_id": id_json(&self.block_id),
            "p_topic_id": id_json(&self.topic_id),
            "p_heading_id": id_json(&self.heading_id),
            "p_concept_id": id_json(&self.concept_id),
            "p_min_difficulty": diff(self.min_difficulty),
            "p_max_difficulty": diff(self.max_difficulty),
        });
        if let Some(session_id) = session_id {
            args["p_session_id"] = session_id.clone();
        }
        args
    }

    /// Rebuild the criteria from a session row's flattened columns.
    pub fn from_session(record: &Record) -> Self {
        let id = |k: &str| {
            record
                .get(k)
                .filter(|v| !v.is_null())
                .map(id_string)
                .filter(|s| !s.is_empty())
        };
        let diff = |k: &str| record.get(k).and_then(Value::as_i64).filter(|d| *d != 0);
        let mut criteria = Self {
            min_difficulty: diff("min_difficulty"),
            max_difficulty: diff("max_difficulty"),
            ..Self::default()
        };
        for level in LEVELS {
            *criteria.slot_mut(level) = id(level.column());
        }
        criteria
    }

    /// Flatten onto a session record: writes the six columns and drops the
    /// form-only helper fields.
    pub fn apply_to_session(&self, mut record: Record) -> Record {
        for field in SESSION_FORM_ONLY {
            record.remove(field);
        }
        let diff = |v: Option<i64>| v.map(Value::from).unwrap_or(Value::Null);
        for level in LEVELS {
            record.insert(level.column().into(), id_json(self.slot(level)));
        }
        record.insert("min_difficulty".into(), diff(self.min_difficulty));
        record.insert("max_difficulty".into(), diff(self.max_difficulty));
        record
    }
}

/// One step of selector interaction, replayed onto a criteria.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CriteriaEdit {
    SwitchLevel {
        level: HierarchyLevel,
    },
    Select {
        level: HierarchyLevel,
        #[serde(default, deserialize_with = "text_or_integer_id")]
        id: Option<String>,
    },
    Difficulty {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    NoSelection,
    Empty,
    Insufficient,
    Sufficient,
}

/// Result of a live pool-size check against a session's question target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolPreview {
    pub count: Option<u64>,
    pub required: u64,
}

impl PoolPreview {
    pub fn status(&self) -> PoolStatus {
        match self.count {
            None => PoolStatus::NoSelection,
            Some(0) => PoolStatus::Empty,
            Some(n) if n < self.required => PoolStatus::Insufficient,
            Some(_) => PoolStatus::Sufficient,
        }
    }

    pub fn message(&self) -> String {
        let plural = |n: u64| if n == 1 { "" } else { "s" };
        match (self.status(), self.count) {
            (PoolStatus::NoSelection, _) => "No selection made yet".into(),
            (PoolStatus::Empty, _) => "No questions match your criteria".into(),
            (PoolStatus::Insufficient, Some(n)) => format!(
                "Only {n} question{} available (need {})",
                plural(n),
                self.required
            ),
            (_, Some(n)) => format!("{n} question{} available", plural(n)),
            (_, None) => "No selection made yet".into(),
        }
    }
}

/// Count the pool for `criteria`. No backend call is made until the current
/// level has a selection.
#[instrument(level = "info", skip(provider), fields(level = ?criteria.level()))]
pub async fn preview(
    provider: &DataProvider,
    criteria: &PoolSelectionCriteria,
    required: u64,
) -> Result<PoolPreview, AdminError> {
    criteria.validate()?;
    if !criteria.has_selection() {
        return Ok(PoolPreview { count: None, required });
    }
    let count = provider.question_count_by_criteria(criteria).await?;
    debug!(target: "pool", count, required, "pool preview");
    Ok(PoolPreview { count: Some(count), required })
}

/// Replay selector edits onto `criteria` and preview the resulting pool.
#[instrument(level = "info", skip(provider, criteria, edits), fields(edits = edits.len()))]
pub async fn resolve(
    provider: &DataProvider,
    criteria: PoolSelectionCriteria,
    edits: Vec<CriteriaEdit>,
    required: u64,
) -> Result<(PoolSelectionCriteria, PoolPreview), AdminError> {
    let criteria = edits.into_iter().try_fold(criteria, PoolSelectionCriteria::apply)?;
    let preview = preview(provider, &criteria, required).await?;
    Ok((criteria, preview))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Choice {
    pub id: Value,
    pub name: String,
}

/// Options for one level's selector, sorted by name and optionally scoped to
/// a parent.
#[instrument(level = "debug", skip(provider))]
pub async fn choices(
    provider: &DataProvider,
    level: HierarchyLevel,
    parent_id: Option<&str>,
) -> Result<Vec<Choice>, AdminError> {
    let mut params = ListParams::new(Pagination::new(1, CHOICES_LIMIT), Sort::asc("name"));
    if let (Some(field), Some(parent)) = (level.parent_field(), parent_id) {
        params = params.filter(field, parent);
    }
    let list = provider.get_list(level.resource(), &params).await?;
    Ok(list
        .data
        .into_iter()
        .map(|r| Choice {
            id: r.get("id").cloned().unwrap_or(Value::Null),
            name: r.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::seeds::demo_dataset;
    use std::sync::Arc;

    fn provider() -> DataProvider {
        DataProvider::new(Arc::new(MemoryStore::from_dataset(demo_dataset()).unwrap()))
    }

    #[test]
    fn level_navigation() {
        assert_eq!(HierarchyLevel::Concept.parent(), Some(HierarchyLevel::Heading));
        assert_eq!(HierarchyLevel::Block.parent(), None);
        assert_eq!(HierarchyLevel::Heading.column(), "heading_id");
        assert_eq!(HierarchyLevel::Topic.parent_field(), Some("block_id"));
        assert_eq!(HierarchyLevel::Block.parent_field(), None);
    }

    #[test]
    fn level_is_the_most_specific_selection() {
        let c = PoolSelectionCriteria::default();
        assert_eq!(c.level(), HierarchyLevel::Concept);
        assert!(!c.has_selection());
        let c = c.select(HierarchyLevel::Topic, Some("7".into()));
        assert_eq!(c.level(), HierarchyLevel::Topic);
        assert!(c.has_selection());
    }

    #[test]
    fn switching_levels_clears_ids_but_keeps_difficulty() {
        let c = PoolSelectionCriteria::default()
            .select(HierarchyLevel::Heading, Some("3".into()))
            .with_difficulty(Some(2), Some(6))
            .unwrap()
            .switch_level(HierarchyLevel::Topic);
        assert_eq!(c.heading_id, None);
        assert_eq!(c.level(), HierarchyLevel::Topic);
        assert_eq!(c.difficulty_bounds(), (2, 6));
        assert!(!c.has_selection());
    }

    #[test]
    fn numeric_and_text_ids_deserialize() {
        let c: PoolSelectionCriteria =
            serde_json::from_value(json!({"heading_id": 1, "max_difficulty": 5})).unwrap();
        assert_eq!(c.heading_id.as_deref(), Some("1"));
        let c: PoolSelectionCriteria =
            serde_json::from_value(json!({"topic_id": "t1", "block_id": "", "concept_id": null})).unwrap();
        assert_eq!(c.topic_id.as_deref(), Some("t1"));
        assert_eq!(c.block_id, None);
        assert!(serde_json::from_value::<PoolSelectionCriteria>(json!({"concept_id": 1.5})).is_err());
        assert!(serde_json::from_value::<PoolSelectionCriteria>(json!({"concept_id": [1]})).is_err());
    }

    #[test]
    fn integer_ids_are_sent_as_numbers() {
        let c = PoolSelectionCriteria { heading_id: Some("1".into()), ..Default::default() };
        assert_eq!(c.rpc_args(None)["p_heading_id"], json!(1));
        let row = c.apply_to_session(Record::new());
        assert_eq!(row["heading_id"], json!(1));
    }

    #[test]
    fn edits_replay_in_order() {
        let edits: Vec<CriteriaEdit> = serde_json::from_value(json!([
            {"op": "select", "level": "block", "id": 1},
            {"op": "switch_level", "level": "heading"},
            {"op": "difficulty", "min": 2, "max": 4}
        ]))
        .unwrap();
        let c = edits
            .into_iter()
            .try_fold(PoolSelectionCriteria::default(), PoolSelectionCriteria::apply)
            .unwrap();
        assert_eq!(c.block_id, None);
        assert_eq!(c.level(), HierarchyLevel::Heading);
        assert_eq!(c.difficulty_bounds(), (2, 4));
        let bad = PoolSelectionCriteria::default().apply(CriteriaEdit::Difficulty { min: Some(9), max: Some(1) });
        assert!(bad.is_err());
    }

    #[test]
    fn selecting_replaces_other_levels() {
        let c = PoolSelectionCriteria::default()
            .select(HierarchyLevel::Block, Some("1".into()))
            .select(HierarchyLevel::Concept, Some("9".into()));
        assert_eq!(c.block_id, None);
        assert_eq!(c.concept_id.as_deref(), Some("9"));
        let cleared = c.select(HierarchyLevel::Concept, Some(String::new()));
        assert!(!cleared.has_selection());
    }

    #[test]
    fn difficulty_is_validated() {
        let c = PoolSelectionCriteria::default();
        assert!(c.clone().with_difficulty(Some(0), None).is_err());
        assert!(c.clone().with_difficulty(Some(8), Some(3)).is_err());
        assert_eq!(c.difficulty_bounds(), (1, 10));
    }

    #[test]
    fn rpc_args_use_nulls_for_unset_values() {
        let c = PoolSelectionCriteria { topic_id: Some("t1".into()), min_difficulty: Some(0), max_difficulty: Some(5), ..Default::default() };
        let args = c.rpc_args(Some(&json!(42)));
        assert_eq!(args["p_topic_id"], "t1");
        assert_eq!(args["p_block_id"], Value::Null);
        assert_eq!(args["p_min_difficulty"], Value::Null);
        assert_eq!(args["p_max_difficulty"], 5);
        assert_eq!(args["p_session_id"], 42);
        assert!(c.rpc_args(None).get("p_session_id").is_none());
    }

    #[test]
    fn session_round_trip_strips_form_fields() {
        let form = json!({
            "name": "Review", "lesson_id": 1,
            "pool_selection_criteria": {"heading_id": "2"},
            "heading_selection": "2", "__temp__": true
        })
        .as_object()
        .cloned()
        .unwrap();
        let criteria = PoolSelectionCriteria { heading_id: Some("2".into()), max_difficulty: Some(4), ..Default::default() };
        let row = criteria.apply_to_session(form);
        assert!(!row.contains_key("pool_selection_criteria"));
        assert!(!row.contains_key("heading_selection"));
        assert!(!row.contains_key("__temp__"));
        assert_eq!(row["heading_id"], 2);
        assert_eq!(row["concept_id"], Value::Null);
        assert_eq!(PoolSelectionCriteria::from_session(&row), criteria);
    }

    #[test]
    fn preview_messages() {
        let p = |count, required| PoolPreview { count, required };
        assert_eq!(p(None, 10).message(), "No selection made yet");
        assert_eq!(p(Some(0), 10).status(), PoolStatus::Empty);
        assert_eq!(p(Some(1), 10).message(), "Only 1 question available (need 10)");
        assert_eq!(p(Some(3), 10).status(), PoolStatus::Insufficient);
        assert_eq!(p(Some(12), 10).message(), "12 questions available");
        assert_eq!(p(Some(10), 10).status(), PoolStatus::Sufficient);
    }

    #[tokio::test]
    async fn preview_skips_the_backend_without_selection() {
        let provider = provider();
        let none = preview(&provider, &PoolSelectionCriteria::default(), 5).await.unwrap();
        assert_eq!(none.count, None);

        let by_heading = PoolSelectionCriteria::default().select(HierarchyLevel::Heading, Some("1".into()));
        let some = preview(&provider, &by_heading, 5).await.unwrap();
        // Active questions under "Past tense": 1, 2 and 4.
        assert_eq!(some.count, Some(3));
        assert_eq!(some.status(), PoolStatus::Insufficient);
    }

    #[tokio::test]
    async fn resolve_previews_the_edited_criteria() {
        let provider = provider();
        let edits = vec![CriteriaEdit::Select { level: HierarchyLevel::Heading, id: Some("1".into()) }];
        let (criteria, preview) = resolve(&provider, PoolSelectionCriteria::default(), edits, 2).await.unwrap();
        assert_eq!(criteria.heading_id.as_deref(), Some("1"));
        assert_eq!(preview.count, Some(3));
        assert_eq!(preview.status(), PoolStatus::Sufficient);
    }

    #[tokio::test]
    async fn choices_are_scoped_and_sorted() {
        let provider = provider();
        let topics = choices(&provider, HierarchyLevel::Topic, Some("1")).await.unwrap();
        let names: Vec<&str> = topics.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Nouns", "Verbs"]);
        let blocks = choices(&provider, HierarchyLevel::Block, Some("ignored")).await.unwrap();
        assert_eq!(blocks.len(), 2);
    }
}
