//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::models::{AuditEntryType, TaskId, TaskStatus, DEFAULT_PRIORITY};

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Chorus - dependency-aware task orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .chorus/
    #[arg(short, long, global = true, env = "CHORUS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a task to the graph
    Add {
        /// Task title (positional argument)
        title: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Tasks this one depends on (comma-separated ids)
        #[arg(short = 'D', long = "depends-on", value_delimiter = ',')]
        depends_on: Vec<TaskId>,

        /// Tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Merge priority (0 = highest, 4 = lowest)
        #[arg(short, long, default_value_t = DEFAULT_PRIORITY, value_parser = clap::value_parser!(u8).range(0..=4))]
        priority: u8,
    },

    /// List tasks in the graph
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Check the graph for cycles and missing dependencies
    Validate,

    /// Show which task would be picked next
    Next {
        /// Boost tasks carrying these tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        prefer: Vec<String>,

        /// Show every ready task with its score
        #[arg(short, long)]
        explain: bool,
    },

    /// Return tasks left in progress by a crashed run to the pool
    Recover,

    /// Show audit trail entries
    Audit {
        /// Only entries for this task
        #[arg(short = 'i', long)]
        task: Option<TaskId>,

        /// Only entries of this type
        #[arg(short = 'T', long = "type")]
        entry_type: Option<AuditTypeArg>,

        /// Maximum number of entries to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Stage reverts of the commits a task produced
    Rollback {
        /// Task ID
        task: TaskId,

        /// Also roll back every task that depends on it
        #[arg(long)]
        with_dependents: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuditTypeArg {
    CrashRecovery,
    Lifecycle,
    Merge,
    Escalation,
    Rollback,
    Progress,
}

impl From<AuditTypeArg> for AuditEntryType {
    fn from(arg: AuditTypeArg) -> Self {
        match arg {
            AuditTypeArg::CrashRecovery => Self::CrashRecovery,
            AuditTypeArg::Lifecycle => Self::Lifecycle,
            AuditTypeArg::Merge => Self::Merge,
            AuditTypeArg::Escalation => Self::Escalation,
            AuditTypeArg::Rollback => Self::Rollback,
            AuditTypeArg::Progress => Self::Progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_splits_dependencies() {
        let cli = Cli::try_parse_from(["chorus", "add", "Wire API", "-D", "ch-1,ch-2", "--tags", "m1"])
            .unwrap();
        match cli.command {
            Commands::Add {
                title,
                depends_on,
                tags,
                priority,
                ..
            } => {
                assert_eq!(title, "Wire API");
                assert_eq!(depends_on, vec![TaskId::from("ch-1"), TaskId::from("ch-2")]);
                assert_eq!(tags, vec!["m1"]);
                assert_eq!(priority, DEFAULT_PRIORITY);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["chorus", "add", "x", "--priority", "9"]).is_err());
    }

    #[test]
    fn test_list_parses_status_and_global_json() {
        let cli = Cli::try_parse_from(["chorus", "list", "--status", "doing", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::List {
                status: Some(TaskStatus::Doing),
                ..
            }
        ));
    }

    #[test]
    fn test_audit_type_maps_to_entry_type() {
        let cli = Cli::try_parse_from(["chorus", "audit", "--type", "crash-recovery"]).unwrap();
        match cli.command {
            Commands::Audit { entry_type, .. } => {
                assert_eq!(entry_type.map(AuditEntryType::from), Some(AuditEntryType::CrashRecovery));
            }
            _ => panic!("expected audit"),
        }
    }
}
