use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::shell_quote;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutoResolveConfig, ConflictTier};
use crate::domain::ports::{AutoResolver, CommandRunner};

/// Runs a configured shell command per conflicting file.
///
/// The template's `{file}` and `{main}` placeholders are substituted before
/// running it in the task worktree. Only simple-tier files are attempted.
pub struct CommandAutoResolver {
    runner: Arc<dyn CommandRunner>,
    template: String,
    main_branch: String,
}

impl CommandAutoResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, template: impl Into<String>) -> Self {
        Self {
            runner,
            template: template.into(),
            main_branch: "main".to_string(),
        }
    }

    pub fn from_config(
        runner: Arc<dyn CommandRunner>,
        config: &AutoResolveConfig,
        main_branch: &str,
    ) -> Self {
        Self::new(runner, config.command.clone()).with_main_branch(main_branch)
    }

    pub fn with_main_branch(mut self, branch: impl Into<String>) -> Self {
        self.main_branch = branch.into();
        self
    }

    /// The command that would run for `file`.
    pub fn render(&self, file: &str) -> String {
        // The template already quotes `{file}`; strip the outer quotes we add.
        let quoted = shell_quote(file);
        let inner = &quoted[1..quoted.len() - 1];
        self.template
            .replace("{file}", inner)
            .replace("{main}", &self.main_branch)
    }
}

#[async_trait]
impl AutoResolver for CommandAutoResolver {
    async fn resolve(&self, file: &str, tier: ConflictTier, cwd: &Path) -> DomainResult<bool> {
        if tier != ConflictTier::Simple {
            debug!(file, %tier, "auto-resolve skipped for non-simple file");
            return Ok(false);
        }
        if file.contains('\n') || file.contains('\0') {
            return Err(DomainError::ValidationFailed(format!("unusable file name: {file:?}")));
        }

        let out = self.runner.run(&self.render(file), cwd).await?;
        if !out.success {
            warn!(file, output = %out.output, "auto-resolve command failed");
        }
        Ok(out.success)
    }
}
