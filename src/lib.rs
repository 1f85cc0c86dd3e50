//! Chorus - dependency-aware task orchestrator
//!
//! Chorus keeps a graph of tasks with dependencies, hands ready tasks to a
//! bounded set of worker slots, and funnels finished work through a
//! single-writer merge queue that climbs a conflict-resolution ladder
//! before asking a human. All state lives in an append-only JSONL log, so a
//! crashed run is recovered by replaying it.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, state machines and port traits
//! - **Service Layer** (`services`): Task graph, selection, orchestration loop, merge pipeline, recovery
//! - **Adapters** (`adapters`): JSONL log, shell and git collaborators, escalation channel
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chorus::adapters::JsonlTaskLog;
//! use chorus::services::{TaskGraph, TaskSelector, SelectionContext};
//!
//! let log = Arc::new(JsonlTaskLog::open(".chorus/tasks.jsonl")?);
//! let mut graph = TaskGraph::load(log, "ch")?;
//! let base = graph.create("Set up workspace", vec![], vec![])?;
//! graph.create("Wire merge queue", vec![base], vec!["m1".into()])?;
//!
//! let next = TaskSelector::new().select(graph.tasks(), &SelectionContext::new());
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{Config, LoggingConfig, MergeItem, Task, TaskId, TaskStatus};
pub use domain::ports::{
    AgentResolver, AutoResolver, CommandRunner, HumanEscalation, MergeWorker, TaskLog,
    WorkerSpawner, WorktreeManager,
};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{MergeService, OrchestrationLoop, TaskGraph, TaskSelector};
