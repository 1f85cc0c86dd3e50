use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for Chorus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory holding the task log and local overrides
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Prefix for sequential task ids (`ch-1`, `ch-2`, ...)
    #[serde(default = "default_task_prefix")]
    pub task_prefix: String,

    /// Integration branch every merge lands on
    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    /// Root directory for per-task worktrees
    #[serde(default = "default_worktrees_dir")]
    pub worktrees_dir: PathBuf,

    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub auto_resolve: AutoResolveConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".chorus")
}

fn default_task_prefix() -> String {
    "ch".to_string()
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_worktrees_dir() -> PathBuf {
    PathBuf::from(".worktrees")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            task_prefix: default_task_prefix(),
            main_branch: default_main_branch(),
            worktrees_dir: default_worktrees_dir(),
            orchestration: OrchestrationConfig::default(),
            merge: MergeConfig::default(),
            selection: SelectionConfig::default(),
            classifier: ClassifierConfig::default(),
            auto_resolve: AutoResolveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Append-only task and audit log.
    pub fn task_log_path(&self) -> PathBuf {
        self.state_dir.join("tasks.jsonl")
    }
}

/// Orchestration loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestrationConfig {
    /// Number of concurrent worker slots (1-64)
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,

    /// Sleep when nothing is assignable, in milliseconds
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// How long `stop` waits for workers before cancelling them, in seconds
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Consecutive assignment failures before the loop pauses itself
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Iterations without a commit before an agent counts as stuck
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,

    /// Assignments allowed over the life of one loop
    #[serde(default = "default_max_total_tasks")]
    pub max_total_tasks: usize,

    /// Stop the loop once every task is done or failed
    #[serde(default)]
    pub exit_when_done: bool,
}

const fn default_max_slots() -> usize {
    3
}

const fn default_idle_backoff_ms() -> u64 {
    250
}

const fn default_drain_timeout_secs() -> u64 {
    300
}

const fn default_error_threshold() -> u32 {
    3
}

const fn default_stuck_threshold() -> u32 {
    5
}

const fn default_max_total_tasks() -> usize {
    100
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_slots: default_max_slots(),
            idle_backoff_ms: default_idle_backoff_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
            error_threshold: default_error_threshold(),
            stuck_threshold: default_stuck_threshold(),
            max_total_tasks: default_max_total_tasks(),
            exit_when_done: false,
        }
    }
}

/// Merge service tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergeConfig {
    /// Sleep when the queue has nothing ready, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retries after which a failed merge needs a human
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
}

const fn default_poll_interval_ms() -> u64 {
    10
}

const fn default_escalation_threshold() -> u32 {
    3
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

/// Additive scoring weights used by the task selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectionWeights {
    #[serde(default = "default_user_hint")]
    pub user_hint: i64,
    #[serde(default = "default_unblocking")]
    pub unblocking: i64,
    #[serde(default = "default_atomicity")]
    pub atomicity: i64,
    #[serde(default = "default_milestone")]
    pub milestone: i64,
    #[serde(default = "default_series")]
    pub series: i64,
    #[serde(default = "default_preferred")]
    pub preferred: i64,
}

const fn default_user_hint() -> i64 {
    200
}

const fn default_unblocking() -> i64 {
    100
}

const fn default_atomicity() -> i64 {
    50
}

const fn default_milestone() -> i64 {
    30
}

const fn default_series() -> i64 {
    25
}

const fn default_preferred() -> i64 {
    10
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            user_hint: default_user_hint(),
            unblocking: default_unblocking(),
            atomicity: default_atomicity(),
            milestone: default_milestone(),
            series: default_series(),
            preferred: default_preferred(),
        }
    }
}

/// Task selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectionConfig {
    /// Tag that marks a task as "do this next"
    #[serde(default = "default_next_tag")]
    pub next_tag: String,

    /// Tags the operator would like worked on first
    #[serde(default)]
    pub preferred_tags: Vec<String>,

    #[serde(default)]
    pub weights: SelectionWeights,
}

fn default_next_tag() -> String {
    "next".to_string()
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            next_tag: default_next_tag(),
            preferred_tags: Vec::new(),
            weights: SelectionWeights::default(),
        }
    }
}

/// Conflict classifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClassifierConfig {
    /// Extra repository paths that are always safe to auto-resolve
    #[serde(default)]
    pub simple_files: Vec<String>,
}

/// Automatic per-file conflict resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AutoResolveConfig {
    /// Shell command run in the task worktree. `{file}` is replaced by the
    /// conflicting path and `{main}` by the integration branch.
    #[serde(default = "default_auto_resolve_command")]
    pub command: String,
}

fn default_auto_resolve_command() -> String {
    "git checkout {main} -- '{file}' && \
     (git diff --cached --quiet -- '{file}' || \
      git commit --no-verify -m 'Take {main} version of {file}' -- '{file}')"
        .to_string()
}

impl Default for AutoResolveConfig {
    fn default() -> Self {
        Self {
            command: default_auto_resolve_command(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Mirror logs to stderr, keeping stdout free for command output
    #[serde(default = "default_true")]
    pub enable_console: bool,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
        }
    }
}
