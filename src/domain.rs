//! Domain models: the registered admin resources, their backing tables, and the
//! field rules the dashboard forms enforce.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdminError;
use crate::records::Record;

/// Every collection the dashboard can manage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
  Blocks,
  Topics,
  Headings,
  Concepts,
  Questions,
  Lessons,
  Sessions,
  ChallengeTemplates,
  /// Virtual resource unioning `app_configuration` and `learning_path_config`.
  AppConfiguration,
}

pub const ALL_RESOURCES: [Resource; 9] = [
  Resource::Blocks,
  Resource::Topics,
  Resource::Headings,
  Resource::Concepts,
  Resource::Questions,
  Resource::Lessons,
  Resource::Sessions,
  Resource::ChallengeTemplates,
  Resource::AppConfiguration,
];

impl Resource {
  pub fn parse(name: &str) -> Result<Self, AdminError> {
    ALL_RESOURCES
      .iter()
      .copied()
      .find(|r| r.name() == name)
      .ok_or_else(|| AdminError::UnknownResource(name.to_string()))
  }

  pub fn name(self) -> &'static str {
    match self {
      Resource::Blocks => "blocks",
      Resource::Topics => "topics",
      Resource::Headings => "headings",
      Resource::Concepts => "concepts",
      Resource::Questions => "questions",
      Resource::Lessons => "lessons",
      Resource::Sessions => "sessions",
      Resource::ChallengeTemplates => "challenge_templates",
      Resource::AppConfiguration => "app_configuration",
    }
  }

  /// Physical table. For the configuration union this is the default table.
  pub fn table(self) -> &'static str {
    self.name()
  }

  pub fn is_config_union(self) -> bool {
    matches!(self, Resource::AppConfiguration)
  }

  pub fn id_field(self) -> &'static str {
    if self.is_config_union() { "config_key" } else { "id" }
  }

  /// Field scoping a reorderable list to one parent.
  pub fn parent_field(self) -> Option<&'static str> {
    match self {
      Resource::Topics => Some("block_id"),
      Resource::Headings => Some("topic_id"),
      Resource::Concepts => Some("heading_id"),
      Resource::Sessions => Some("lesson_id"),
      _ => None,
    }
  }

  pub fn is_orderable(self) -> bool {
    matches!(
      self,
      Resource::Blocks
        | Resource::Topics
        | Resource::Headings
        | Resource::Concepts
        | Resource::Lessons
        | Resource::Sessions
    )
  }

  /// Resources whose rows carry an active/draft/archived status.
  pub fn has_status(self) -> bool {
    matches!(
      self,
      Resource::Blocks
        | Resource::Topics
        | Resource::Headings
        | Resource::Concepts
        | Resource::Questions
        | Resource::Lessons
    )
  }

  fn required_fields(self) -> &'static [&'static str] {
    match self {
      Resource::Blocks | Resource::Lessons => &["name"],
      Resource::Topics => &["name", "block_id"],
      Resource::Headings => &["name", "topic_id"],
      Resource::Concepts => &["name", "heading_id"],
      Resource::Questions => &[
        "text",
        "option_a",
        "option_b",
        "option_c",
        "correct_option",
        "explanation",
        "concept_id",
        "difficulty",
        "status",
      ],
      Resource::Sessions => &[
        "name",
        "lesson_id",
        "number_of_questions",
        "order",
        "question_selection_strategy",
      ],
      Resource::ChallengeTemplates => &["name", "number_of_questions", "xp_multiplier"],
      Resource::AppConfiguration => &["config_key", "config_value"],
    }
  }

  /// Check a record before it is written. Create requires the form's required
  /// fields; both modes check ranges and enumerations of the fields present.
  pub fn validate(self, record: &Record, mode: WriteMode) -> Result<(), AdminError> {
    let fail = |msg: String| Err(AdminError::validation(self.name(), msg));

    if mode == WriteMode::Create {
      for field in self.required_fields() {
        if matches!(record.get(*field), None | Some(Value::Null)) {
          return fail(format!("{field} is required"));
        }
        if record.get(*field).and_then(Value::as_str).is_some_and(|s| s.trim().is_empty()) {
          return fail(format!("{field} must not be empty"));
        }
      }
    }

    if self.has_status() {
      if let Some(v) = present(record, "status") {
        if ContentStatus::parse(v).is_none() {
          return fail(format!("status must be one of active, draft, archived (got {v})"));
        }
      }
    }

    match self {
      Resource::Questions => {
        if let Some(v) = present(record, "difficulty") {
          match as_int(v) {
            Some(d) if (DIFFICULTY_MIN..=DIFFICULTY_MAX).contains(&d) => {}
            _ => return fail(format!("difficulty must be between 1 and 10 (got {v})")),
          }
        }
        if let Some(v) = present(record, "correct_option") {
          if CorrectOption::parse(v).is_none() {
            return fail(format!("correct_option must be a, b or c (got {v})"));
          }
        }
      }
      Resource::Sessions => {
        if let Some(v) = present(record, "number_of_questions") {
          if !as_int(v).is_some_and(|n| n >= 1) {
            return fail(format!("number_of_questions must be at least 1 (got {v})"));
          }
        }
        if let Some(v) = present(record, "question_selection_strategy") {
          if SelectionStrategy::parse(v).is_none() {
            return fail(format!("unknown question_selection_strategy {v}"));
          }
        }
        let min = present(record, "min_difficulty").map(|v| (v, as_int(v)));
        let max = present(record, "max_difficulty").map(|v| (v, as_int(v)));
        for (v, parsed) in [min, max].into_iter().flatten() {
          if !parsed.is_some_and(|d| (DIFFICULTY_MIN..=DIFFICULTY_MAX).contains(&d)) {
            return fail(format!("difficulty bounds must be between 1 and 10 (got {v})"));
          }
        }
        if let (Some((_, Some(lo))), Some((_, Some(hi)))) = (min, max) {
          if lo > hi {
            return fail(format!("min_difficulty {lo} exceeds max_difficulty {hi}"));
          }
        }
      }
      Resource::ChallengeTemplates => {
        if let Some(v) = present(record, "xp_multiplier") {
          if !v.as_f64().is_some_and(|x| x > 0.0) {
            return fail(format!("xp_multiplier must be positive (got {v})"));
          }
        }
        if let Some(v) = present(record, "number_of_questions") {
          if !as_int(v).is_some_and(|n| n >= 1) {
            return fail(format!("number_of_questions must be at least 1 (got {v})"));
          }
        }
      }
      Resource::AppConfiguration => {
        if let Some(v) = present(record, "source_table") {
          if v.as_str().and_then(ConfigTable::parse).is_none() {
            return fail(format!("unknown source_table {v}"));
          }
        }
      }
      _ => {}
    }
    Ok(())
  }
}

impl fmt::Display for Resource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
  Create,
  Update,
}

pub const DIFFICULTY_MIN: i64 = 1;
pub const DIFFICULTY_MAX: i64 = 10;

fn present<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
  record.get(field).filter(|v| !v.is_null())
}

fn as_int(v: &Value) -> Option<i64> {
  match v {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// The two physical tables behind the configuration resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigTable {
  #[default]
  AppConfiguration,
  LearningPathConfig,
}

impl ConfigTable {
  pub const BOTH: [ConfigTable; 2] = [ConfigTable::AppConfiguration, ConfigTable::LearningPathConfig];

  pub fn as_str(self) -> &'static str {
    match self {
      ConfigTable::AppConfiguration => "app_configuration",
      ConfigTable::LearningPathConfig => "learning_path_config",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::BOTH.into_iter().find(|t| t.as_str() == s)
  }

  /// Table named by a record's `source_table` field, if any.
  pub fn of_record(record: &Record) -> Option<Self> {
    record.get("source_table").and_then(Value::as_str).and_then(Self::parse)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
  Active,
  Draft,
  Archived,
}

impl ContentStatus {
  pub const ALL: [ContentStatus; 3] = [ContentStatus::Active, ContentStatus::Draft, ContentStatus::Archived];

  pub fn as_str(self) -> &'static str {
    match self {
      ContentStatus::Active => "active",
      ContentStatus::Draft => "draft",
      ContentStatus::Archived => "archived",
    }
  }

  fn parse(v: &Value) -> Option<Self> {
    let s = v.as_str()?;
    Self::ALL.into_iter().find(|st| st.as_str() == s)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectOption {
  A,
  B,
  C,
}

impl CorrectOption {
  fn parse(v: &Value) -> Option<Self> {
    match v.as_str()?.to_ascii_lowercase().as_str() {
      "a" => Some(CorrectOption::A),
      "b" => Some(CorrectOption::B),
      "c" => Some(CorrectOption::C),
      _ => None,
    }
  }
}

/// How a session draws questions from its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
  Random,
  WeightedByDifficulty,
  Adaptive,
  SpacedRepetition,
}

impl SelectionStrategy {
  fn parse(v: &Value) -> Option<Self> {
    match v.as_str()? {
      "random" => Some(SelectionStrategy::Random),
      "weighted_by_difficulty" => Some(SelectionStrategy::WeightedByDifficulty),
      "adaptive" => Some(SelectionStrategy::Adaptive),
      "spaced_repetition" => Some(SelectionStrategy::SpacedRepetition),
      _ => None,
    }
  }
}
