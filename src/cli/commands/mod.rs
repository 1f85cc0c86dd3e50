//! CLI command implementations.

pub mod audit;
pub mod recover;
pub mod rollback;
pub mod task;
pub mod validate;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::jsonl::JsonlTaskLog;
use crate::domain::models::Config;
use crate::domain::ports::TaskLog;
use crate::services::{AuditTrail, TaskGraph};

/// The task graph and audit trail replayed from the state directory.
pub struct Workspace {
    pub config: Config,
    pub graph: TaskGraph,
    pub audit: AuditTrail,
    /// Repository root that git commands run in
    pub repo: PathBuf,
}

impl Workspace {
    pub fn open(config: Config) -> Result<Self> {
        let path = config.task_log_path();
        let log: Arc<dyn TaskLog> = Arc::new(
            JsonlTaskLog::open(&path)
                .with_context(|| format!("Failed to open task log at {}", path.display()))?,
        );
        let graph = TaskGraph::load(Arc::clone(&log), config.task_prefix.clone())
            .context("Failed to replay task graph")?;
        let audit = AuditTrail::load(log).context("Failed to replay audit trail")?;
        let repo = std::env::current_dir().context("Failed to resolve working directory")?;

        Ok(Self {
            config,
            graph,
            audit,
            repo,
        })
    }
}
