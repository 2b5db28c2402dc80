//! Saving a session together with its question pool.
//!
//! The session form edits the pool criteria as one nested value; the table
//! stores it as six flat columns. After the row is written the pool is rebuilt
//! by the backend. A pool failure never undoes the save, it is reported
//! alongside the saved record.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::domain::Resource;
use crate::error::{AdminError, AdminResult};
use crate::pool::PoolSelectionCriteria;
use crate::provider::DataProvider;
use crate::records::{id_string, Record};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PoolOutcome {
    Populated { count: u64 },
    /// No hierarchy level was selected, so there is nothing to populate.
    Skipped,
    Failed { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSaved {
    pub data: Record,
    pub pool: PoolOutcome,
    pub message: String,
}

impl SessionSaved {
    fn new(data: Record, pool: PoolOutcome) -> Self {
        let message = match &pool {
            PoolOutcome::Populated { count } => {
                format!("Session saved successfully! {count} questions added to pool")
            }
            PoolOutcome::Failed { error } => format!("Session saved but failed to populate pool: {error}"),
            PoolOutcome::Skipped => "Session saved successfully".to_string(),
        };
        Self { data, pool, message }
    }
}

/// Criteria for a save: explicit argument first, then a nested
/// `pool_selection_criteria` in the form data, then the flat columns. On
/// update the flat columns are read from the stored row with `data` laid over
/// it, so a partial patch keeps the stored selection.
async fn criteria_for(
    provider: &DataProvider,
    id: Option<&Value>,
    data: &Record,
    explicit: Option<PoolSelectionCriteria>,
) -> AdminResult<PoolSelectionCriteria> {
    if let Some(c) = explicit {
        return Ok(c);
    }
    if let Some(nested) = data.get("pool_selection_criteria").filter(|v| !v.is_null()) {
        return serde_json::from_value(nested.clone())
            .map_err(|e| AdminError::validation(Resource::Sessions.name(), format!("invalid pool_selection_criteria: {e}")));
    }
    let Some(id) = id else {
        return Ok(PoolSelectionCriteria::from_session(data));
    };
    let mut merged = provider.get_one(Resource::Sessions, id).await?;
    merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(PoolSelectionCriteria::from_session(&merged))
}

async fn populate(provider: &DataProvider, session_id: &Value, criteria: &PoolSelectionCriteria) -> PoolOutcome {
    if !criteria.has_selection() {
        return PoolOutcome::Skipped;
    }
    match provider.populate_session_question_pool(session_id, criteria).await {
        Ok(count) => PoolOutcome::Populated { count },
        Err(e) => {
            warn!(target: "pool", session = %id_string(session_id), error = %e, "pool population failed after save");
            PoolOutcome::Failed { error: e.to_string() }
        }
    }
}

/// Create (`id` is `None`) or update a session, then rebuild its pool.
#[instrument(level = "info", skip(provider, data, criteria))]
pub async fn save_session(
    provider: &DataProvider,
    id: Option<&Value>,
    data: Record,
    criteria: Option<PoolSelectionCriteria>,
) -> AdminResult<SessionSaved> {
    let criteria = criteria_for(provider, id, &data, criteria).await?;
    criteria.validate()?;
    let record = criteria.apply_to_session(data);

    let saved = match id {
        Some(id) => provider.update(Resource::Sessions, id, record, None).await?,
        None => provider.create(Resource::Sessions, record).await?,
    };
    let session_id = saved.get("id").cloned().unwrap_or(Value::Null);
    let pool = populate(provider, &session_id, &criteria).await;
    info!(target: "admin_backend", session = %id_string(&session_id), ?pool, "session saved");
    Ok(SessionSaved::new(saved, pool))
}

/// Rebuild the pool of a stored session from its own columns.
#[instrument(level = "info", skip(provider))]
pub async fn repopulate(provider: &DataProvider, id: &Value) -> AdminResult<u64> {
    let session = provider.get_one(Resource::Sessions, id).await?;
    let criteria = PoolSelectionCriteria::from_session(&session);
    if !criteria.has_selection() {
        return Err(AdminError::validation(
            Resource::Sessions.name(),
            "session has no concept, heading, topic or block selected",
        ));
    }
    provider.populate_session_question_pool(id, &criteria).await
}
