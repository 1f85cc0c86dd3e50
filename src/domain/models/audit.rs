//! Audit trail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::task::TaskId;

/// Kind of event an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryType {
    CrashRecovery,
    Lifecycle,
    Merge,
    Escalation,
    Rollback,
    Progress,
}

impl AuditEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrashRecovery => "crash_recovery",
            Self::Lifecycle => "lifecycle",
            Self::Merge => "merge",
            Self::Escalation => "escalation",
            Self::Rollback => "rollback",
            Self::Progress => "progress",
        }
    }
}

impl fmt::Display for AuditEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: AuditEntryType,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

impl AuditEntry {
    pub fn new(task_id: TaskId, entry_type: AuditEntryType, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            timestamp: Utc::now(),
            entry_type,
            action: action.into(),
            payload: Value::Object(serde_json::Map::new()),
        }
    }

    /// Add a key to the payload object.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.payload {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Context handed to whoever resumes a task that crashed before.
///
/// Derived on demand from the task's retry count, its audit history and a
/// probe of its worktree; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryContext {
    pub retry_count: u32,
    pub audit_entries: Vec<AuditEntry>,
    pub has_worktree_changes: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_type_key() {
        let entry = AuditEntry::new(TaskId::from("ch-1"), AuditEntryType::CrashRecovery, "reset_to_todo")
            .with_field("previous_retry_count", 0);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "crash_recovery");
        assert_eq!(json["action"], "reset_to_todo");
        assert_eq!(json["payload"]["previous_retry_count"], 0);
    }
}
