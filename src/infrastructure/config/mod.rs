//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML project files under `.chorus/`
//! - Environment variable overrides (`CHORUS_*`)
//! - Configuration validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
