use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AuditEntry, Task};

/// One line of the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    /// Full snapshot of a task after a mutation; the last one per id wins.
    Task(Task),
    Audit(AuditEntry),
}

/// Append-only persistence for task snapshots and audit entries.
///
/// Synchronous on purpose: every graph mutation is persisted inside the
/// same turn of the orchestration loop that made it.
pub trait TaskLog: Send + Sync {
    fn append(&self, record: &LogRecord) -> DomainResult<()>;

    /// Every record in write order.
    fn replay(&self) -> DomainResult<Vec<LogRecord>>;
}
