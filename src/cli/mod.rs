//! Command-line surface: argument types, output formatting and command
//! handlers.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use anyhow::Result;

use crate::domain::models::Config;
use commands::Workspace;

/// Run one parsed command against the workspace described by `config`.
pub async fn dispatch(command: Commands, config: Config, json: bool) -> Result<()> {
    let mut ws = Workspace::open(config)?;

    match command {
        Commands::Add {
            title,
            description,
            depends_on,
            tags,
            priority,
        } => commands::task::handle_add(&mut ws, title, description, depends_on, tags, priority, json),
        Commands::List { status, tag } => commands::task::handle_list(&ws, status, tag, json),
        Commands::Validate => commands::validate::handle_validate(&ws, json),
        Commands::Next { prefer, explain } => commands::task::handle_next(&ws, prefer, explain, json),
        Commands::Recover => commands::recover::handle_recover(&mut ws, json),
        Commands::Audit {
            task,
            entry_type,
            limit,
        } => commands::audit::handle_audit(&ws, task, entry_type, limit, json),
        Commands::Rollback {
            task,
            with_dependents,
        } => commands::rollback::handle_rollback(&ws, task, with_dependents, json).await,
    }
}

/// Print an error in the requested format and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| err.to_string())
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
