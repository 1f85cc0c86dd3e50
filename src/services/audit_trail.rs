//! Append-only audit trail backed by the task log.
//!
//! Entries are written to the log first and only then become visible to
//! queries. Clones share the same in-memory index.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AuditEntry, AuditEntryType, TaskId};
use crate::domain::ports::{LogRecord, TaskLog};

/// Filter for querying audit entries.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub task_id: Option<TaskId>,
    pub entry_type: Option<AuditEntryType>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_task(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    pub fn with_type(mut self, entry_type: AuditEntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.task_id.as_ref().is_none_or(|id| &entry.task_id == id)
            && self.entry_type.is_none_or(|t| entry.entry_type == t)
            && self.action.as_ref().is_none_or(|a| &entry.action == a)
            && self.from.is_none_or(|from| entry.timestamp >= from)
            && self.to.is_none_or(|to| entry.timestamp <= to)
    }
}

#[derive(Clone)]
pub struct AuditTrail {
    log: Arc<dyn TaskLog>,
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl AuditTrail {
    pub fn new(log: Arc<dyn TaskLog>) -> Self {
        Self {
            log,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rebuild the trail from every audit record in the log.
    pub fn load(log: Arc<dyn TaskLog>) -> DomainResult<Self> {
        let entries: Vec<AuditEntry> = log
            .replay()?
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Audit(entry) => Some(entry),
                LogRecord::Task(_) => None,
            })
            .collect();
        debug!(entries = entries.len(), "audit trail replayed");
        Ok(Self {
            log,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    pub fn append(&self, entry: AuditEntry) -> DomainResult<()> {
        self.log.append(&LogRecord::Audit(entry.clone()))?;
        debug!(
            task_id = %entry.task_id,
            entry_type = %entry.entry_type,
            action = %entry.action,
            "audit entry appended"
        );
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }

    /// All entries for a task, oldest first.
    pub fn history(&self, task_id: &TaskId) -> Vec<AuditEntry> {
        self.query(&AuditFilter::new().for_task(task_id.clone()))
    }

    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matched: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
