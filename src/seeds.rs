//! Built-in demo dataset for the in-memory backend.
//!
//! Small but complete: two blocks with their syllabus tree, a handful of
//! questions across difficulties and statuses, lessons with sessions, one
//! challenge template and entries in both configuration tables. Used when no
//! fixture file is configured, and by tests.

use serde_json::{json, Value};

pub fn demo_dataset() -> Value {
  json!({
    "blocks": [
      { "id": 1, "name": "Foundations", "order": 1, "status": "active", "created_at": "2025-01-10T09:00:00Z" },
      { "id": 2, "name": "Everyday Conversation", "order": 2, "status": "draft", "created_at": "2025-01-11T09:00:00Z" }
    ],
    "topics": [
      { "id": 1, "block_id": 1, "name": "Verbs", "order": 1, "status": "active" },
      { "id": 2, "block_id": 1, "name": "Nouns", "order": 2, "status": "active" },
      { "id": 3, "block_id": 2, "name": "Greetings", "order": 1, "status": "draft" }
    ],
    "headings": [
      { "id": 1, "topic_id": 1, "name": "Past tense", "order": 1, "status": "active" },
      { "id": 2, "topic_id": 1, "name": "Future tense", "order": 2, "status": "active" },
      { "id": 3, "topic_id": 2, "name": "Plurals", "order": 1, "status": "active" },
      { "id": 4, "topic_id": 3, "name": "Formal greetings", "order": 1, "status": "draft" }
    ],
    "concepts": [
      { "id": 1, "heading_id": 1, "name": "Irregular past", "order": 1, "status": "active" },
      { "id": 2, "heading_id": 1, "name": "Regular past", "order": 2, "status": "active" },
      { "id": 3, "heading_id": 2, "name": "Will vs going to", "order": 1, "status": "active" },
      { "id": 4, "heading_id": 3, "name": "Irregular plurals", "order": 1, "status": "archived" },
      { "id": 5, "heading_id": 4, "name": "Good morning", "order": 1, "status": "draft" }
    ],
    "questions": [
      { "id": 1, "concept_id": 1, "text": "Yesterday I ___ to school.", "option_a": "went", "option_b": "go", "option_c": "gone",
        "correct_option": "a", "explanation": "'Go' is irregular: went.", "difficulty": 2, "status": "active", "created_at": "2025-02-01T10:00:00Z" },
      { "id": 2, "concept_id": 1, "text": "She ___ the answer.", "option_a": "knowed", "option_b": "knew", "option_c": "known",
        "correct_option": "b", "explanation": "'Know' becomes 'knew'.", "difficulty": 4, "status": "active", "created_at": "2025-02-02T10:00:00Z" },
      { "id": 3, "concept_id": 1, "text": "They ___ home early.", "option_a": "went", "option_b": "goed", "option_c": "going",
        "correct_option": "a", "explanation": "Simple past of 'go'.", "difficulty": 6, "status": "draft", "created_at": "2025-02-03T10:00:00Z" },
      { "id": 4, "concept_id": 2, "text": "We ___ the film.", "option_a": "watch", "option_b": "watched", "option_c": "watching",
        "correct_option": "b", "explanation": "Regular verbs add -ed.", "difficulty": 1, "status": "active", "created_at": "2025-02-04T10:00:00Z" },
      { "id": 5, "concept_id": 3, "text": "Look at the clouds! It ___ rain.", "option_a": "will", "option_b": "is going to", "option_c": "shall",
        "correct_option": "b", "explanation": "Evidence in the present: going to.", "difficulty": 7, "status": "active", "created_at": "2025-02-05T10:00:00Z" },
      { "id": 6, "concept_id": 4, "text": "One mouse, two ___.", "option_a": "mouses", "option_b": "mice", "option_c": "mouse",
        "correct_option": "b", "explanation": "Irregular plural.", "difficulty": 3, "status": "active", "created_at": "2025-02-06T10:00:00Z" }
    ],
    "lessons": [
      { "id": 1, "name": "Talking about yesterday", "order": 1, "status": "active", "created_at": "2025-03-01T08:00:00Z" },
      { "id": 2, "name": "Making plans", "order": 2, "status": "draft", "created_at": "2025-03-02T08:00:00Z" }
    ],
    "sessions": [
      { "id": 1, "lesson_id": 1, "name": "Irregular verbs warm-up", "number_of_questions": 2, "order": 1,
        "question_selection_strategy": "random", "concept_id": 1, "heading_id": null, "topic_id": null, "block_id": null,
        "min_difficulty": null, "max_difficulty": null },
      { "id": 2, "lesson_id": 1, "name": "Past tense review", "number_of_questions": 10, "order": 2,
        "question_selection_strategy": "adaptive", "concept_id": null, "heading_id": 1, "topic_id": null, "block_id": null,
        "min_difficulty": 1, "max_difficulty": 5 }
    ],
    "challenge_templates": [
      { "id": 1, "name": "Speed round", "challenge_type": "timed", "time_limit": 60, "number_of_questions": 10,
        "question_selection_algorithm": "random", "scoring_formula": "standard", "xp_multiplier": 1.5,
        "cooldown_period": 24, "active": true }
    ],
    "app_configuration": [
      { "config_key": "daily_xp_goal", "config_value": 50, "data_type": "integer", "category": "gamification",
        "description": "XP needed to complete the daily goal" },
      { "config_key": "max_lives", "config_value": 5, "data_type": "integer", "category": "gamification",
        "description": "Lives available before a cooldown" }
    ],
    "learning_path_config": [
      { "config_key": "lesson_unlock_threshold", "config_value": 0.8, "data_type": "string", "category": "learning",
        "description": "Share of sessions to pass before the next lesson unlocks" }
    ]
  })
}
