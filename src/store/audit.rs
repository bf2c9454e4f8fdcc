use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    StatusChanged,
    StageChanged,
    Converted,
    Sent,
    Accepted,
    Superseded,
    Invoiced,
    CreditApplied,
    Paid,
    Picked,
    Completed,
}

/// Append-only trail entry. Immutable once written; one entry per entity
/// mutated by a core operation, committed in the same transaction as the
/// mutation it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

pub fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}
