use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::validate_branch_name;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_slots: {0}. Must be between 1 and 64")]
    InvalidMaxSlots(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid task prefix: {0:?}. Must be non-empty ASCII letters, digits or '-'")]
    InvalidTaskPrefix(String),

    #[error("Invalid main branch name: {0:?}")]
    InvalidMainBranch(String),

    #[error("Invalid {name}: {value}. Must be at least 1")]
    InvalidThreshold { name: &'static str, value: u64 },

    #[error("auto_resolve.command cannot be empty")]
    EmptyAutoResolveCommand,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .chorus/config.yaml (project config)
    /// 3. .chorus/local.yaml (local overrides, optional)
    /// 4. Environment variables (CHORUS_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `root` instead of the
    /// current directory.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let state = root.as_ref().join(".chorus");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(state.join("config.yaml")))
            .merge(Yaml::file(state.join("local.yaml")))
            .merge(Env::prefixed("CHORUS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let slots = config.orchestration.max_slots;
        if slots == 0 || slots > 64 {
            return Err(ConfigError::InvalidMaxSlots(slots));
        }

        let prefix = &config.task_prefix;
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::InvalidTaskPrefix(prefix.clone()));
        }

        if validate_branch_name(&config.main_branch).is_err() {
            return Err(ConfigError::InvalidMainBranch(config.main_branch.clone()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let thresholds = [
            ("orchestration.error_threshold", u64::from(config.orchestration.error_threshold)),
            ("orchestration.stuck_threshold", u64::from(config.orchestration.stuck_threshold)),
            ("orchestration.max_total_tasks", config.orchestration.max_total_tasks as u64),
            ("merge.escalation_threshold", u64::from(config.merge.escalation_threshold)),
            ("merge.poll_interval_ms", config.merge.poll_interval_ms),
        ];
        for (name, value) in thresholds {
            if value == 0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if config.auto_resolve.command.trim().is_empty() {
            return Err(ConfigError::EmptyAutoResolveCommand);
        }

        if config.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "state_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
