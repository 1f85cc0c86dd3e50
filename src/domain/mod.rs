//! Domain layer for the Chorus orchestrator
//!
//! Task, merge and conflict models, the app-level state machines, and the
//! port traits every external collaborator is injected through.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
