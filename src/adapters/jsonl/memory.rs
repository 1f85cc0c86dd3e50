use std::sync::{Mutex, PoisonError};

use crate::domain::errors::DomainResult;
use crate::domain::ports::{LogRecord, TaskLog};

/// In-memory task log for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTaskLog {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryTaskLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskLog for MemoryTaskLog {
    fn append(&self, record: &LogRecord) -> DomainResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn replay(&self) -> DomainResult<Vec<LogRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
